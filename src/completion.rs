/// A single segment paired with the user's description of what to pull out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseRequest<'a> {
    pub content: &'a str,
    pub description: &'a str,
}

impl<'a> ParseRequest<'a> {
    pub fn new(content: &'a str, description: &'a str) -> Self {
        Self {
            content,
            description,
        }
    }

    pub fn render_prompt(&self) -> String {
        format!(
            "You are tasked with extracting specific information from the following text content:\n\
\n\
{content}\n\
\n\
Please follow these instructions precisely:\n\
\n\
1. **Targeted Extraction:** Extract only the information that directly matches the following description:\n   \
{description}\n\
2. **No Commentary:** Do not include any explanations, summaries, or extra text.\n\
3. **Empty Response Rule:** If no matching information is found, return an empty string (`''`).\n\
4. **Output Format:** Respond with only the extracted data, with no markdown, no labels and no formatting.\n",
            content = self.content,
            description = self.description,
        )
    }
}

/// Black-box text completion. Implementations may fail; callers decide
/// whether and how to retry.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn invoke(&self, request: &ParseRequest<'_>) -> anyhow::Result<String>;
}
