//! Judge prompts.
//!
//! Placeholders `{query}` and `{retrieved_text}` are substituted by the
//! judge evaluator. Both prompts ask for the same three keys so one parser
//! handles either scale.

/// Collection of prompts used by the LLM-as-judge evaluator.
pub struct Prompts;

impl Prompts {
    /// Prompt for the 1–10 scale variant, with a one-sentence comment.
    pub fn judge_ten_point() -> &'static str {
        r#"Respond ONLY with valid JSON.
Evaluate the quality of the retrieved text along three dimensions, each scored from 1 to 10:

Question:
{query}

Retrieved text:
"""{retrieved_text}"""

Return exactly this JSON:
{
  "relevance": <number>,
  "coherence": <number>,
  "fidelity": <number>,
  "comment": "<one short sentence summarizing your judgement>"
}"#
    }

    /// Prompt for the 0–5 scale variant, scores only.
    pub fn judge_five_point() -> &'static str {
        r#"You are an expert evaluator of information retrieval systems.
Evaluate the retrieved text against the question, assigning scores from 0 to 5.

Question:
{query}

Retrieved response:
{retrieved_text}

Return ONLY a JSON object with the format:
{
  "relevance": <number>,
  "coherence": <number>,
  "fidelity": <number>
}"#
    }

    /// System prompt for the judge.
    pub fn system_judge() -> &'static str {
        "You are a strict, impartial evaluator of retrieved passages. Always respond with valid JSON when requested."
    }

    /// Fill a judge template in one pass, so placeholder text inside the
    /// query or the retrieved text is never substituted again.
    pub fn render(template: &str, query: &str, retrieved_text: &str) -> String {
        let mut out = String::with_capacity(template.len() + query.len() + retrieved_text.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{query}") {
                out.push_str(query);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{retrieved_text}") {
                out.push_str(retrieved_text);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::judge_ten_point().is_empty());
        assert!(!Prompts::judge_five_point().is_empty());
        assert!(!Prompts::system_judge().is_empty());
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let prompt = Prompts::render(Prompts::judge_ten_point(), "¿Quién?", "Un texto.");
        assert!(prompt.contains("¿Quién?"));
        assert!(prompt.contains(r#""""Un texto.""""#));
        assert!(!prompt.contains("{query}"));
        assert!(!prompt.contains("{retrieved_text}"));
        // JSON braces in the template survive
        assert!(prompt.contains("\"relevance\": <number>"));
    }

    #[test]
    fn test_render_leaves_placeholders_inside_values() {
        let prompt = Prompts::render("Q: {query}\nT: {retrieved_text}", "why {retrieved_text}?", "body {query}");
        assert_eq!(prompt, "Q: why {retrieved_text}?\nT: body {query}");
    }
}
