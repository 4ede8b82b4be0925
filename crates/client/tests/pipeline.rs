//! Client pipeline behavior that needs no live vendor: the HTTP/2 body
//! guard, cancellation, and streaming structured output over replayed
//! bytes.

use mp_client::{Client, ObjectStream, STRUCTURED_OUTPUT_TOOL};
use mp_domain::context::Context;
use mp_domain::error::{Error, HttpProtocol};
use mp_domain::options::GenerateOptions;
use mp_domain::schema::{Field, FieldType, Schema};
use mp_providers::http::HttpConfig;
use mp_providers::registry::ProviderRegistry;
use futures_util::StreamExt;
use mp_providers::stream::{stream_from_bytes, StreamResponse};
use serde_json::json;

/// A prompt whose encoded body clears the 65,535-byte HTTP/2 margin.
fn oversized_prompt() -> String {
    "x".repeat(70_000)
}

#[tokio::test]
async fn http2_pool_rejects_oversized_bodies() {
    let client = Client::builder()
        .http(HttpConfig {
            protocols: vec![HttpProtocol::Http2, HttpProtocol::Http1],
            ..Default::default()
        })
        .build()
        .unwrap();

    let err = client
        .generate_text("groq:llama-3.3-70b-versatile", oversized_prompt(), &GenerateOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Http2BodyTooLarge { size, protocols } => {
            assert!(size > 65_535);
            assert_eq!(protocols, vec![HttpProtocol::Http2, HttpProtocol::Http1]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn http1_pool_passes_the_same_body() {
    std::env::remove_var("GROQ_API_KEY");
    let client = Client::builder()
        .http(HttpConfig {
            protocols: vec![HttpProtocol::Http1],
            ..Default::default()
        })
        .build()
        .unwrap();

    // Same oversized request: the guard lets it through, so the pipeline
    // proceeds to credential resolution (which fails here, proving no
    // guard error fired).
    let err = client
        .generate_text("groq:llama-3.3-70b-versatile", oversized_prompt(), &GenerateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "unexpected: {err:?}");
}

#[tokio::test]
async fn pre_cancelled_token_aborts_before_dispatch() {
    let client = Client::new().unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let mut opts = GenerateOptions {
        cancel: Some(cancel),
        ..Default::default()
    };
    opts.provider_options
        .insert("api_key".into(), json!("sk-test-not-real"));

    let err = client
        .generate_text("openai:gpt-4o-mini", "hi", &opts)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled), "unexpected: {err:?}");
}

#[tokio::test]
async fn stream_object_yields_final_object_from_replayed_bytes() {
    // Anthropic wire bytes for a forced structured_output call, split so
    // the argument fragments arrive separately.
    let events = [
        json!({"type": "message_start",
               "message": {"id": "msg_1", "model": "claude-3-haiku-20240307",
                            "usage": {"input_tokens": 20, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0,
               "content_block": {"type": "tool_use", "id": "toolu_1",
                                  "name": STRUCTURED_OUTPUT_TOOL, "input": {}}}),
        json!({"type": "content_block_delta", "index": 0,
               "delta": {"type": "input_json_delta", "partial_json": "{\"name\":\"Ada\","}}),
        json!({"type": "content_block_delta", "index": 0,
               "delta": {"type": "input_json_delta", "partial_json": "\"age\":36}"}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"},
               "usage": {"output_tokens": 18}}),
        json!({"type": "message_stop"}),
    ];
    let bytes: Vec<Vec<u8>> = events
        .iter()
        .map(|e| format!("data: {e}\n\n").into_bytes())
        .collect();

    let catalog = mp_catalog::Catalog::builtin();
    let model = catalog.resolve_spec("anthropic:claude-3-haiku-20240307").unwrap();
    let provider = ProviderRegistry::builtin().get("anthropic").unwrap();
    let stream = stream_from_bytes(provider, model.clone(), bytes);
    let inner = StreamResponse::new(model, Context::default(), stream);

    let schema = Schema::new()
        .field(Field::new("name", FieldType::String).required())
        .field(Field::new("age", FieldType::PosInteger).required());
    let objects = ObjectStream::new(inner, schema).collect_objects().await.unwrap();

    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["name"], "Ada");
    assert_eq!(objects[0]["age"], 36);
}

#[tokio::test]
async fn object_stream_adapts_to_a_futures_stream() {
    let bytes = vec![
        format!(
            "data: {}\n\n",
            json!({"type": "content_block_start", "index": 0,
                   "content_block": {"type": "tool_use", "id": "toolu_2",
                                      "name": STRUCTURED_OUTPUT_TOOL, "input": {}}})
        )
        .into_bytes(),
        format!(
            "data: {}\n\n",
            json!({"type": "content_block_delta", "index": 0,
                   "delta": {"type": "input_json_delta",
                              "partial_json": "{\"name\":\"Lin\",\"age\":7}"}})
        )
        .into_bytes(),
        b"event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".to_vec(),
    ];

    let catalog = mp_catalog::Catalog::builtin();
    let model = catalog.resolve_spec("anthropic:claude-3-haiku-20240307").unwrap();
    let provider = ProviderRegistry::builtin().get("anthropic").unwrap();
    let stream = stream_from_bytes(provider, model.clone(), bytes);
    let inner = StreamResponse::new(model, Context::default(), stream);

    let schema = Schema::new()
        .field(Field::new("name", FieldType::String).required())
        .field(Field::new("age", FieldType::PosInteger).required());
    let collected: Vec<_> = ObjectStream::new(inner, schema).into_stream().collect().await;

    assert_eq!(collected.len(), 1);
    let object = collected[0].as_ref().unwrap();
    assert_eq!(object["name"], "Lin");
    assert_eq!(object["age"], 7);
}
