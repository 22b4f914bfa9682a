use crate::types::{FileMetadata, PromptSegments};
use std::path::Path;

const SYSTEM_INSTRUCTION: &str = "You are a Senior Code Auditor and Software Quality Analyst. \
Your task is to perform a critical, detailed review of the source code provided, acting as an \
experienced and meticulous technical code reviewer. Be objective, constructive and precise.";

const NO_CRITERIA: &str = "No additional criteria were provided.";

/// Mandatory review dimensions, in report order.
const DIMENSIONS: [&str; 5] = [
    "1.  **Business Logic and Requirements 🎯:** Does the code implement clear, cohesive logic? \
Based on the code, what appears to be its main goal? Are there parts that look confusing, \
incomplete or potentially wrong with respect to a plausible business goal?",
    "2.  **Quality and Good Practices (Clean Code) 🧼:** Is the code readable and well structured? \
Assess naming of variables and functions, comments (useful or noise?), function complexity \
(short and focused?), and overall adherence to clean-code principles and the language's style guide.",
    concat!(
        "3.  **Security and Vulnerabilities 🛡️:** Are there obvious security issues? Check for:\n",
        "   - API keys, passwords or other credentials hardcoded in the source.\n",
        "   - Missing input validation (where applicable).\n",
        "   - Use of libraries known to be vulnerable or unsafe constructs (e.g. evaluating ",
        "untrusted input, deserializing untrusted data).",
    ),
    "4.  **Maintainability and Scalability 🏗️:** Is the code easy to maintain and change? Assess \
coupling between components, modularity, and whether the design would allow new features or \
better performance without a massive refactor.",
    "5.  **Error Handling and Resilience 🩹:** How does the code deal with errors? Is there \
appropriate handling and propagation? Is logging used to record important events or failures? \
What would happen in a failure scenario (network failure, missing file, bad input)?",
];

/// Fence tag for the code block, from the file extension.
pub fn language_hint(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "py" | "pyw" => "python",
        "rs" => "rust",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "cs" => "csharp",
        "go" => "go",
        "rb" => "ruby",
        "php" => "php",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "sh" | "bash" => "bash",
        "sql" => "sql",
        "yaml" | "yml" => "yaml",
        "tf" => "hcl",
        _ => "",
    }
}

fn task_body(meta: &FileMetadata, criteria: &str) -> String {
    let mut s = String::with_capacity(meta.content.len() + 4096);

    s.push_str("\n--- SOURCE CODE UNDER REVIEW ---\n");
    s.push_str(&format!("File: `{}`\n", meta.file_name));
    s.push_str(&format!(
        "```{}\n{}\n```\n\n",
        language_hint(&meta.file_name),
        meta.content
    ));

    s.push_str("--- MANDATORY REVIEW POINTS ---\n");
    s.push_str(
        "Analyse the code above and assess EACH of the following points. For each point give a \
status (Implemented ✅, Partially Implemented ⚠️, Not Implemented ❌, or Note ℹ️), a detailed \
explanation and, where relevant, code excerpts as evidence (HTML-escaped).\n\n",
    );
    for d in DIMENSIONS {
        s.push_str(d);
        s.push_str("\n\n");
    }

    let criteria = criteria.trim();
    let criteria = if criteria.is_empty() { NO_CRITERIA } else { criteria };
    s.push_str("--- ADDITIONAL REVIEW REQUESTED BY THE USER ---\n");
    s.push_str("Besides the standard review, check the following points requested by the user:\n\n");
    s.push_str(&format!("**User Criteria:** \"{}\"", criteria));

    s
}

fn output_format(file_name: &str) -> String {
    let lines = [
        "\n--- MANDATORY OUTPUT FORMAT: HTML5 DOCUMENT ---".to_string(),
        "Your answer MUST be a SINGLE ```html ... ``` block containing a complete, well formed \
HTML5 document. NOTHING may be written outside this block.\n"
            .to_string(),
        "**HTML structure:**".to_string(),
        format!(
            "1.  **`<head>`:** Include `<meta charset=\"UTF-8\">`, an informative `<title>` such as \
`Code Audit Report: {file_name}`, and an embedded `<style>` with a clean, professional design \
(dark blue and grey, with green/yellow/red highlights for statuses)."
        ),
        "2.  **`<body>`:**".to_string(),
        format!("   - **Header:** Main heading `<h1>Code Audit Report: {file_name}</h1>`."),
        "   - **File Details:** A table with the metadata: Name, Size, Lines, Hash, Audit Date."
            .to_string(),
        "   - **Overall Summary:** One paragraph summarising your conclusions about code quality."
            .to_string(),
        "   - **Detailed Review:** One section (e.g. a `div` with class `card`) for EACH mandatory \
review point and for the user's criteria."
            .to_string(),
        "     - Each section has an `<h4>` with the point's title (e.g. `<h4>🎯 Business Logic</h4>`)."
            .to_string(),
        "     - Include the status with its emoji.".to_string(),
        "     - Give your detailed analysis in paragraphs.".to_string(),
        "     - Show code evidence inside `<pre><code>...</code></pre>`, escaping HTML characters \
such as `<` and `>` (`&lt;`, `&gt;`)."
            .to_string(),
        "   - **Footer:** A simple footer with `Generated by AI Code Auditor` and the year."
            .to_string(),
    ];
    lines.join("\n")
}

/// Build the three prompt segments for one file. Pure and deterministic.
pub fn build_prompt(meta: &FileMetadata, criteria: &str) -> PromptSegments {
    PromptSegments {
        system: SYSTEM_INSTRUCTION.to_string(),
        task: task_body(meta, criteria),
        output_format: output_format(&meta.file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn meta(name: &str, content: &str) -> FileMetadata {
        FileMetadata {
            path: PathBuf::from("/src").join(name),
            file_name: name.to_string(),
            size: content.len() as u64,
            lines: content.lines().count(),
            content_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
            modified: "2024-01-02 03:04:05".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn same_inputs_same_segments() {
        let m = meta("calc.py", "def add(a, b):\n    return a + b\n");
        let a = build_prompt(&m, "check overflow");
        let b = build_prompt(&m, "check overflow");
        assert_eq!(a, b);
        assert_eq!(a.as_array().len(), 3);
    }

    #[test]
    fn task_embeds_file_and_criteria() {
        let m = meta("calc.py", "def add(a, b):\n    return a + b\n");
        let p = build_prompt(&m, "  no globals  ");

        assert!(p.task.contains("File: `calc.py`"));
        assert!(p.task.contains("```python\ndef add(a, b):\n    return a + b\n\n```"));
        assert!(p.task.contains("**User Criteria:** \"no globals\""));
        for n in 1..=5 {
            assert!(p.task.contains(&format!("{n}.  **")));
        }
        // dimensions come before the user's criteria
        let dims = p.task.find("MANDATORY REVIEW POINTS").unwrap();
        let user = p.task.find("User Criteria").unwrap();
        assert!(dims < user);
    }

    #[test]
    fn empty_criteria_uses_placeholder() {
        let m = meta("x.py", "pass\n");
        let p = build_prompt(&m, "");
        assert!(p.task.contains(NO_CRITERIA));
    }

    #[test]
    fn output_format_names_the_file_in_title() {
        let m = meta("service.rs", "fn main() {}\n");
        let p = build_prompt(&m, "");
        assert!(p.output_format.contains("`Code Audit Report: service.rs`"));
        assert!(p.output_format.contains("```html"));
        assert!(p.task.contains("```rust\n"));
        assert_eq!(p.system, SYSTEM_INSTRUCTION);
    }

    #[test]
    fn unknown_extension_has_bare_fence() {
        assert_eq!(language_hint("Makefile"), "");
        assert_eq!(language_hint("a.PY"), "python");
    }
}
