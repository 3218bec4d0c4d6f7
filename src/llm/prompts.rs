//! Prompt builders

use crate::domain::Category;
use crate::ports::ReplyRequest;

/// Longest comment excerpt sent to the model
const MAX_COMMENT_CHARS: usize = 2000;

pub const CLASSIFIER_SYSTEM: &str = "You classify social media comments. \
Answer with exactly one category name and nothing else.";

fn category_description(category: Category) -> &'static str {
    match category {
        Category::Praise => "compliments, thanks, positive feedback",
        Category::Question => "asks something about the content or the creator",
        Category::Criticism => "constructive negative feedback",
        Category::Disagreement => "disagrees with an opinion expressed in the content",
        Category::Offensive => "insults, hate, harassment",
        Category::Spam => "ads, self-promotion, links, scams, repeated text",
        Category::Neutral => "anything that fits no other category",
        Category::ContentRequest => "asks for a new video or topic",
    }
}

fn category_guidance(category: Category) -> &'static str {
    match category {
        Category::Praise => "Thank them warmly and keep it short.",
        Category::Question => "Answer helpfully if you can; otherwise say you will look into it.",
        Category::Criticism => "Acknowledge the point respectfully without being defensive.",
        Category::Disagreement => "Respect their view and briefly restate yours without arguing.",
        Category::ContentRequest => "Thank them for the idea and say you will consider it.",
        Category::Neutral => "Reply briefly and in a friendly way.",
        Category::Offensive | Category::Spam => "Do not reply.",
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(MAX_COMMENT_CHARS).collect()
}

/// User message for the classifier
pub fn classification_prompt(text: &str) -> String {
    let mut prompt = String::from("Categories:\n");
    for category in Category::ALL {
        prompt.push_str(&format!("- {}: {}\n", category.as_str(), category_description(category)));
    }
    prompt.push_str("\nComment:\n\"\"\"\n");
    prompt.push_str(&excerpt(text));
    prompt.push_str("\n\"\"\"\n\nCategory:");
    prompt
}

/// System prompt for the responder
pub fn reply_system_prompt(request: &ReplyRequest<'_>) -> String {
    let mut prompt = format!(
        "You are {}, replying to comments on your own channel.\n\
         Tone: {}.\n\
         Write the reply in {}.\n\
         Keep it to at most two short sentences. No hashtags. Never invent facts or links.",
        request.persona,
        request.tone.describe(),
        request.language,
    );
    if let Some(instruction) = request.custom_instruction.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\nAdditional instruction: ");
        prompt.push_str(instruction.trim());
    }
    prompt
}

/// User message for the responder
pub fn reply_user_prompt(request: &ReplyRequest<'_>) -> String {
    format!(
        "Comment ({}):\n\"\"\"\n{}\n\"\"\"\n\n{}\nReply:",
        request.category.as_str(),
        excerpt(request.text),
        category_guidance(request.category),
    )
}

/// Strip wrapping quotes and whitespace models like to add
pub fn clean_reply(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Policy, Tone};

    #[test]
    fn test_classification_prompt_lists_every_category() {
        let prompt = classification_prompt("nice video");
        for category in Category::ALL {
            assert!(prompt.contains(category.as_str()));
        }
        assert!(prompt.contains("nice video"));
    }

    #[test]
    fn test_long_comments_are_truncated() {
        let long = "a".repeat(MAX_COMMENT_CHARS + 500);
        let prompt = classification_prompt(&long);
        assert!(!prompt.contains(&long));
    }

    #[test]
    fn test_reply_prompt_carries_policy() {
        let policy = Policy {
            persona_name: "Bia".to_string(),
            tone: Tone::Formal,
            language: "en-US".to_string(),
            custom_instruction: Some("Mention the newsletter".to_string()),
            ..Default::default()
        };
        let req = ReplyRequest::new("why?", Category::Question, &policy);
        let system = reply_system_prompt(&req);
        assert!(system.contains("Bia"));
        assert!(system.contains(Tone::Formal.describe()));
        assert!(system.contains("en-US"));
        assert!(system.contains("Mention the newsletter"));

        let user = reply_user_prompt(&req);
        assert!(user.contains("question"));
        assert!(user.contains("why?"));
    }

    #[test]
    fn test_blank_instruction_omitted() {
        let policy = Policy {
            custom_instruction: Some("   ".to_string()),
            ..Default::default()
        };
        let req = ReplyRequest::new("x", Category::Praise, &policy);
        assert!(!reply_system_prompt(&req).contains("Additional instruction"));
    }

    #[test]
    fn test_clean_reply() {
        assert_eq!(clean_reply("  \"Thanks!\"\n"), "Thanks!");
    }
}
