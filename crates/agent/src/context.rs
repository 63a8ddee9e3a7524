//! Context-window management: priority-based in-place truncation.
//!
//! The budget is what remains of `max_context_tokens` after reserving
//! room for the response and the fixed request overhead (system prompt
//! plus tool schemas). Truncation is idempotent and always preserves
//! the first message and the last four.

use krillclaw_core::message::estimate_conversation_tokens;
use krillclaw_core::{Message, Role, ToolDef};
use tracing::debug;

/// Messages at the tail that are never pruned.
const MIN_TAIL: usize = 4;

#[derive(Debug, Clone)]
pub struct ContextWindow {
    max_context_tokens: usize,
    reserve: usize,
}

impl ContextWindow {
    pub fn new(
        max_context_tokens: usize,
        max_tokens: u32,
        system_prompt: Option<&str>,
        tools: &[ToolDef],
    ) -> Self {
        let fixed = system_prompt.map(|s| s.len() / 4).unwrap_or(0)
            + tools
                .iter()
                .map(|t| (t.name.len() + t.description.len() + t.input_schema.len()) / 4)
                .sum::<usize>();
        Self {
            max_context_tokens,
            reserve: max_tokens as usize + fixed,
        }
    }

    /// Tokens available for conversation history.
    pub fn budget(&self) -> usize {
        self.max_context_tokens.saturating_sub(self.reserve)
    }

    /// Prune `conversation` in place until it fits the budget, in
    /// three ordered passes: assistant messages with no tool-use block,
    /// then user messages with no tool-result block (results are small
    /// and high-signal, they stay), then the oldest survivors. If that
    /// still isn't enough, the first message is replaced with a marker
    /// noting how much history was dropped.
    pub fn truncate(&self, conversation: &mut Vec<Message>) {
        let budget = self.budget();
        if estimate_conversation_tokens(conversation) < budget {
            return;
        }
        let before = conversation.len();
        let mut dropped = 0usize;

        // Pass 1: assistant messages that carry no tool calls
        self.drop_matching(conversation, &mut dropped, |m| {
            m.role == Role::Assistant && !m.has_tool_use()
        });
        // Pass 2: user messages that carry no tool results
        self.drop_matching(conversation, &mut dropped, |m| {
            m.role == Role::User && !m.has_tool_result()
        });
        // Pass 3: whatever is oldest
        while estimate_conversation_tokens(conversation) >= budget
            && conversation.len() > MIN_TAIL + 1
        {
            conversation.remove(1);
            dropped += 1;
        }

        if estimate_conversation_tokens(conversation) >= budget && dropped > 0 {
            // The first message goes too; the marker takes its place
            let marker = Message::user_text(format!(
                "[conversation truncated: {} earlier messages dropped]",
                dropped + 1
            ));
            conversation[0] = marker;
        }

        if dropped > 0 {
            debug!(
                dropped,
                kept = conversation.len(),
                was = before,
                budget,
                "conversation truncated"
            );
        }
    }

    /// Remove messages matching `predicate` from the prunable middle
    /// (everything but the first message and the last four), oldest
    /// first, until the conversation fits.
    fn drop_matching(
        &self,
        conversation: &mut Vec<Message>,
        dropped: &mut usize,
        predicate: impl Fn(&Message) -> bool,
    ) {
        let budget = self.budget();
        let mut i = 1;
        while estimate_conversation_tokens(conversation) >= budget {
            if conversation.len() <= MIN_TAIL + 1 || i >= conversation.len() - MIN_TAIL {
                return;
            }
            if predicate(&conversation[i]) {
                conversation.remove(i);
                *dropped += 1;
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krillclaw_core::ContentBlock;

    fn text_message(role: Role, chars: usize) -> Message {
        let text = "x".repeat(chars);
        match role {
            Role::User => Message::user_text(text),
            _ => Message::assistant(vec![ContentBlock::text(text)]),
        }
    }

    /// 20 alternating 400-char messages, as in the pressure scenario.
    fn chatty_conversation() -> Vec<Message> {
        (0..20)
            .map(|i| {
                text_message(
                    if i % 2 == 0 { Role::User } else { Role::Assistant },
                    400,
                )
            })
            .collect()
    }

    #[test]
    fn under_budget_is_untouched() {
        let window = ContextWindow::new(10_000, 100, None, &[]);
        let mut conv = vec![Message::user_text("hi"), text_message(Role::Assistant, 50)];
        let snapshot = conv.clone();
        window.truncate(&mut conv);
        assert_eq!(conv, snapshot);
    }

    #[test]
    fn budget_subtracts_reserve_and_fixed_overhead() {
        let tools = [ToolDef {
            name: "bash",
            description: "Run a command",
            input_schema: r#"{"type":"object"}"#,
        }];
        let window = ContextWindow::new(200, 50, Some("a".repeat(40).as_str()), &tools);
        // 200 - 50 - 10 (system) - ~9 (tool def chars / 4)
        assert!(window.budget() < 140);
        assert!(window.budget() > 120);
    }

    #[test]
    fn pressure_leaves_marker_and_recent_tail() {
        // budget = 200 - 50 - 10 = 140 tokens; each message ~102
        let system = "s".repeat(40);
        let window = ContextWindow::new(200, 50, Some(&system), &[]);
        let conv_orig = chatty_conversation();
        let mut conv = conv_orig.clone();
        window.truncate(&mut conv);

        // marker + the four most recent originals
        assert_eq!(conv.len(), MIN_TAIL + 1);
        assert!(conv[0].text().contains("truncated"), "{}", conv[0].text());
        assert_eq!(conv[1..], conv_orig[16..]);
    }

    #[test]
    fn truncation_is_idempotent() {
        let window = ContextWindow::new(200, 50, None, &[]);
        let mut conv = chatty_conversation();
        window.truncate(&mut conv);
        let snapshot = conv.clone();
        window.truncate(&mut conv);
        assert_eq!(conv, snapshot);
    }

    #[test]
    fn tool_results_outlive_plain_text() {
        // Tool-result messages survive pass 2 while text-only user
        // messages in the middle are dropped first.
        let window = ContextWindow::new(600, 50, None, &[]);
        let mut conv = vec![Message::user_text("first prompt")];
        conv.push(Message::assistant(vec![
            ContentBlock::tool_use("t1", "bash", r#"{"command":"ls"}"#),
        ]));
        conv.push(Message::tool_results(vec![ContentBlock::tool_result(
            "t1", "a.txt", false,
        )]));
        for _ in 0..6 {
            conv.push(text_message(Role::User, 200));
            conv.push(text_message(Role::Assistant, 200));
        }
        window.truncate(&mut conv);

        let kept_tool_result = conv.iter().any(|m| m.has_tool_result());
        assert!(kept_tool_result, "tool result should survive early passes");
        assert!(
            estimate_conversation_tokens(&conv) < window.budget(),
            "early passes alone should reach the budget here"
        );
    }

    #[test]
    fn short_conversation_never_pruned_below_tail() {
        let window = ContextWindow::new(10, 5, None, &[]);
        let mut conv = vec![
            Message::user_text("a".repeat(100)),
            text_message(Role::Assistant, 100),
            Message::user_text("b".repeat(100)),
        ];
        let len = conv.len();
        window.truncate(&mut conv);
        // Nothing prunable (len <= MIN_TAIL + 1): untouched
        assert_eq!(conv.len(), len);
    }

    #[test]
    fn fits_budget_or_is_marker_plus_tail() {
        // The §8 invariant, as a property over several budgets
        for max_context in [150, 300, 600, 1200, 5000] {
            let window = ContextWindow::new(max_context, 50, None, &[]);
            let mut conv = chatty_conversation();
            window.truncate(&mut conv);
            let total = estimate_conversation_tokens(&conv);
            let fits = total < window.budget();
            let marker_form = conv.len() <= MIN_TAIL + 1
                && (conv[0].text().contains("truncated")
                    || conv.len() == chatty_conversation().len());
            assert!(
                fits || marker_form,
                "max_context={max_context}: total={total} len={}",
                conv.len()
            );
        }
    }
}
