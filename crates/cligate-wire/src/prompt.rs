use cligate_core::chat::{ChatMessage, ContentBlock, MessageContent, Role};

/// Flatten a conversation into the single prompt string the CLI takes.
///
/// Each text becomes one `[ROLE]: text` line; images become `[ROLE]: [IMAGE]`.
pub fn build_user_prompt(messages: &[ChatMessage]) -> String {
    let mut parts = Vec::new();
    for msg in messages {
        let tag = role_tag(msg.role);
        match &msg.content {
            MessageContent::Text(text) => parts.push(format!("[{tag}]: {text}")),
            MessageContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => parts.push(format!("[{tag}]: {text}")),
                        ContentBlock::ImageUrl { .. } => parts.push(format!("[{tag}]: [IMAGE]")),
                        ContentBlock::Unsupported => {}
                    }
                }
            }
        }
    }
    parts.join("\n")
}

fn role_tag(role: Role) -> &'static str {
    match role {
        Role::System => "SYSTEM",
        Role::User => "USER",
        Role::Assistant => "ASSISTANT",
        Role::Tool => "TOOL",
    }
}
