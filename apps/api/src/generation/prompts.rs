#![allow(dead_code)]

// All LLM prompt constants for the Generation module.

/// System prompt for the main generation call.
pub const GENERATION_SYSTEM: &str = "You are an expert prompt engineer who creates detailed, \
    structured prompts that maximize AI performance.";

/// Meta prompt template. Replace `{user_input}` before sending.
pub const META_PROMPT_TEMPLATE: &str = r#"You are a sophisticated prompt engineering assistant. Your task is to transform the user's simple request into a detailed, well-structured prompt that will produce optimal results when used with AI tools.

Transform the following user input into a professional, detailed prompt using this structure:

**Role:** Define the AI's role/expertise relevant to the request
**Objective:** Clear statement of what needs to be accomplished
**Context:** Background information and use case details
**Technical Specifications:** Specific requirements, frameworks, technologies
**Acceptance Criteria:** Clear success criteria and requirements
**Output Format:** Specify exactly how the response should be formatted

Make the prompt comprehensive, actionable, and ready to copy-paste into any AI tool. Include all necessary technical details an AI would need to provide an excellent response.

User Input: "{user_input}"

Generate a well-structured prompt:"#;

/// System prompt for history title generation — enforces title-only output.
pub const TITLE_SYSTEM: &str = "You are an assistant that writes short, descriptive titles. \
    Respond with the title only. \
    Do NOT use quotes. \
    Do NOT add punctuation at the end. \
    Do NOT include explanations.";

/// Title prompt template. Replace `{user_input}` before sending.
pub const TITLE_PROMPT_TEMPLATE: &str = r#"Write a concise title (3 to 6 words) summarizing what the following request is about.

Request:
{user_input}"#;

/// Builds the meta prompt sent for the main generation call.
pub fn build_meta_prompt(user_input: &str) -> String {
    META_PROMPT_TEMPLATE.replace("{user_input}", user_input)
}

/// Builds the prompt for the history title call.
pub fn build_title_prompt(user_input: &str) -> String {
    TITLE_PROMPT_TEMPLATE.replace("{user_input}", user_input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_meta_prompt_inlines_input() {
        let prompt = build_meta_prompt("a rust web scraper");
        assert!(prompt.contains("User Input: \"a rust web scraper\""));
        assert!(!prompt.contains("{user_input}"));
    }

    #[test]
    fn test_build_title_prompt_inlines_input() {
        let prompt = build_title_prompt("a rust web scraper");
        assert!(prompt.ends_with("a rust web scraper"));
        assert!(!prompt.contains("{user_input}"));
    }
}
