//! The conversation context: an immutable, ordered sequence of messages.
//!
//! Mutators return a new [`Context`]; the original is never modified. A
//! context holds at most one system message, which providers that require a
//! dedicated system field extract during encoding.

use crate::error::{Error, Result};
use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    messages: Vec<Message>,
}

impl Context {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// A new context with `message` appended.
    pub fn append(&self, message: Message) -> Self {
        let mut messages = self.messages.clone();
        messages.push(message);
        Self { messages }
    }

    /// A new context with `message` prepended.
    pub fn prepend(&self, message: Message) -> Self {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(message);
        messages.extend(self.messages.iter().cloned());
        Self { messages }
    }

    /// A new context holding this context's messages followed by `other`'s.
    pub fn concat(&self, other: &Context) -> Self {
        let mut messages = self.messages.clone();
        messages.extend(other.messages.iter().cloned());
        Self { messages }
    }

    /// The system message, if present.
    pub fn system(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::System)
    }

    /// The system message text, for providers that lift it to a dedicated
    /// request field.
    pub fn system_text(&self) -> Option<String> {
        self.system().map(|m| m.extract_all_text())
    }

    /// Messages excluding the system message, in order.
    pub fn without_system(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }

    /// Validate the cross-message invariants:
    /// - every message passes [`Message::validate`];
    /// - at most one system message;
    /// - every `tool` message answers a tool call emitted by an earlier
    ///   assistant message.
    pub fn validate(&self) -> Result<()> {
        let mut system_count = 0usize;
        let mut seen_call_ids: HashSet<&str> = HashSet::new();

        for msg in &self.messages {
            msg.validate()?;
            match msg.role {
                Role::System => {
                    system_count += 1;
                    if system_count > 1 {
                        return Err(Error::Validation(
                            "context contains more than one system message".into(),
                        ));
                    }
                }
                Role::Assistant => {
                    for call in &msg.tool_calls {
                        seen_call_ids.insert(call.id.as_str());
                    }
                    for (id, _, _) in msg.tool_call_parts() {
                        seen_call_ids.insert(id);
                    }
                }
                Role::Tool => {
                    let id = msg.tool_call_id.as_deref().unwrap_or("");
                    if !seen_call_ids.contains(id) {
                        return Err(Error::Validation(format!(
                            "tool message answers unknown tool_call_id {id:?}"
                        )));
                    }
                }
                Role::User => {}
            }
        }
        Ok(())
    }

    /// Accept a bare string, a message list, or an existing context and
    /// return a validated [`Context`].
    pub fn normalize(input: impl Into<Prompt>) -> Result<Self> {
        let ctx = match input.into() {
            Prompt::Text(text) => Context::new(vec![Message::user(text)]),
            Prompt::Messages(messages) => Context::new(messages),
            Prompt::Context(ctx) => ctx,
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// Concatenated text of all assistant messages' text parts.
    pub fn assistant_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.extract_all_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a Context {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl IntoIterator for Context {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl FromIterator<Message> for Context {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Anything callers may pass where a conversation is expected.
#[derive(Debug, Clone)]
pub enum Prompt {
    Text(String),
    Messages(Vec<Message>),
    Context(Context),
}

impl From<&str> for Prompt {
    fn from(s: &str) -> Self {
        Prompt::Text(s.to_string())
    }
}

impl From<String> for Prompt {
    fn from(s: String) -> Self {
        Prompt::Text(s)
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(messages: Vec<Message>) -> Self {
        Prompt::Messages(messages)
    }
}

impl From<Message> for Prompt {
    fn from(message: Message) -> Self {
        Prompt::Messages(vec![message])
    }
}

impl From<Context> for Prompt {
    fn from(ctx: Context) -> Self {
        Prompt::Context(ctx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ContentPart;
    use crate::tool::ToolCall;
    use serde_json::json;

    #[test]
    fn append_returns_new_context() {
        let a = Context::new(vec![Message::user("hi")]);
        let b = a.append(Message::assistant("hello"));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn prepend_and_concat_preserve_order() {
        let a = Context::new(vec![Message::user("2")]);
        let b = a.prepend(Message::system("1"));
        let c = b.concat(&Context::new(vec![Message::assistant("3")]));
        let roles: Vec<Role> = c.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn normalize_bare_string() {
        let ctx = Context::normalize("Say: pong").unwrap();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.messages()[0].role, Role::User);
        assert_eq!(ctx.messages()[0].text(), Some("Say: pong"));
    }

    #[test]
    fn normalize_message_list() {
        let ctx =
            Context::normalize(vec![Message::system("Reply briefly."), Message::user("Greet me")])
                .unwrap();
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn two_system_messages_invalid() {
        let ctx = Context::new(vec![Message::system("a"), Message::system("b")]);
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn system_anywhere_is_extracted() {
        let ctx = Context::new(vec![Message::user("q"), Message::system("sys")]);
        assert!(ctx.validate().is_ok());
        assert_eq!(ctx.system_text().as_deref(), Some("sys"));
        assert_eq!(ctx.without_system().count(), 1);
    }

    #[test]
    fn tool_message_must_answer_prior_call() {
        // No prior assistant tool call: invalid.
        let ctx = Context::new(vec![
            Message::user("q"),
            Message::tool_result("call_9", "t", json!({})),
        ]);
        assert!(ctx.validate().is_err());

        // With the call declared on a prior assistant message: valid.
        let mut assistant = Message::assistant("let me check");
        assistant.tool_calls = vec![ToolCall::new(Some("call_9".into()), "t", "{}")];
        let ctx = Context::new(vec![
            Message::user("q"),
            assistant,
            Message::tool_result("call_9", "t", json!({})),
        ]);
        assert!(ctx.validate().is_ok(), "{:?}", ctx.validate());
    }

    #[test]
    fn tool_call_part_also_satisfies_linkage() {
        let assistant = Message::assistant_parts(vec![ContentPart::ToolCall {
            id: "call_7".into(),
            name: "t".into(),
            input: json!({}),
        }]);
        let ctx = Context::new(vec![
            Message::user("q"),
            assistant,
            Message::tool_result("call_7", "t", json!({"ok": true})),
        ]);
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn iteration_is_restartable() {
        let ctx = Context::new(vec![Message::user("a"), Message::assistant("b")]);
        let first: Vec<_> = (&ctx).into_iter().collect();
        let second: Vec<_> = (&ctx).into_iter().collect();
        assert_eq!(first.len(), second.len());
    }
}
