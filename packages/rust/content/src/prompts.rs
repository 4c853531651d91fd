//! Prompt text for the chat-completions backend.

use sitebuilder_shared::{BuildRequest, CopyDraft};

pub(crate) const DRAFT_SYSTEM: &str = "You write website copy for small and medium businesses. \
Reply with a single JSON object {\"headline\": string, \"body\": string} and nothing else. \
The headline is at most 12 words. The body is one or two short paragraphs of plain text, \
without markup.";

pub(crate) const JUDGE_SYSTEM: &str = "You are a strict copy editor. Score the website copy \
you are given on two scales from 0 to 5: fluency (grammar, flow, readability) and originality \
(avoids cliches and generic filler). Reply with a single JSON object \
{\"fluency\": number, \"originality\": number} and nothing else.";

pub(crate) const TOKENS_SYSTEM: &str = "You are a visual designer. Propose a theme for a \
professional business website. Reply with a single JSON object \
{\"palette\": [hex color, ...], \"font_pair\": [heading font, body font]} and nothing else. \
The palette has 3 to 5 colors, the first being the accent color for headings. \
Fonts must be freely available web fonts.";

pub(crate) const TOKENS_PROMPT: &str = "Propose a palette and font pairing.";

pub(crate) fn draft_prompt(request: &BuildRequest) -> String {
    let industry = request
        .industry_code()
        .map(|code| format!("Industry classification (NACE): {code}\n"))
        .unwrap_or_default();
    format!(
        "Organization: {}\nOrganization number: {}\n{industry}\
         Write the landing page headline and introduction for this organization.",
        request.organization_name(),
        request.organization_id(),
    )
}

pub(crate) fn judge_prompt(draft: &CopyDraft) -> String {
    format!("Headline:\n{}\n\nBody:\n{}", draft.headline, draft.body)
}

/// Strip a Markdown code fence some models wrap around JSON replies.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_prompt_mentions_industry_when_present() {
        let req = BuildRequest::new("999000999", "Acme", "basic", Some("62.01".into())).unwrap();
        let prompt = draft_prompt(&req);
        assert!(prompt.contains("Acme"));
        assert!(prompt.contains("999000999"));
        assert!(prompt.contains("62.01"));

        let req = BuildRequest::new("999000999", "Acme", "basic", None).unwrap();
        assert!(!draft_prompt(&req).contains("NACE"));
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}
