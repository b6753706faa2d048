// Prompt generation pipeline: validate → resolve caller → check quota →
// stream from the LLM → persist history for signed-in callers.
// All LLM calls go through llm_client — no direct completions API calls here.

pub mod handlers;
pub mod prompts;
pub mod stream;
