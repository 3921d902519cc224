//! Language classification.
//!
//! [`LanguageClassifier`] is the seam for the auto-detect heuristic.
//! [`HeuristicClassifier`] scores text against weighted regex rules for the
//! registered language set, and [`detect_language`] applies the
//! component-tag refinement on top of whatever classifier is plugged in.

use regex::Regex;
use tracing::trace;

use crate::error::CoreError;

/// Guesses the language of a text blob.
pub trait LanguageClassifier: Send + Sync {
    /// Returns the best-guess language tag, or `None` when not confident.
    fn classify(&self, text: &str) -> Option<String>;
}

/// Classify `text` and narrow scripting languages to their component-syntax
/// variant when the text contains `<Tag` or `</Tag` with an uppercase tag.
///
/// Returns `None` when the classifier has no confident result.
pub fn detect_language(classifier: &dyn LanguageClassifier, text: &str) -> Option<String> {
    let base = classifier.classify(text)?;
    Some(refine_component_syntax(base, text))
}

/// Upgrade `javascript` to `jsx` and `typescript` to `tsx` when component
/// tags are present. Any other tag is returned unchanged.
pub fn refine_component_syntax(tag: String, text: &str) -> String {
    let variant = match tag.as_str() {
        "javascript" => "jsx",
        "typescript" => "tsx",
        _ => return tag,
    };
    if has_component_tag(text) {
        variant.to_owned()
    } else {
        tag
    }
}

/// Whether `text` contains `<` or `</` immediately followed by an ASCII
/// uppercase letter.
pub fn has_component_tag(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'<')
        .any(|(i, _)| {
            let rest = &bytes[i + 1..];
            let rest = rest.strip_prefix(b"/").unwrap_or(rest);
            rest.first().is_some_and(u8::is_ascii_uppercase)
        })
}

/// Map a language tag or alias to the highlighter grammar that renders it.
///
/// Returns `None` for unknown tags; the editor falls back to `clike` while
/// the gallery shows the raw tag.
pub fn grammar_for(tag: &str) -> Option<&'static str> {
    let grammar = match tag.to_ascii_lowercase().as_str() {
        "js" | "javascript" => "javascript",
        "jsx" => "jsx",
        "ts" | "typescript" => "typescript",
        "tsx" => "tsx",
        "py" | "python" => "python",
        "html" | "xml" | "svg" => "markup",
        "css" => "css",
        "sql" => "sql",
        "java" => "java",
        "cs" | "csharp" => "csharp",
        "cpp" => "cpp",
        "php" => "php",
        "go" => "go",
        "rb" | "ruby" => "ruby",
        "rust" => "rust",
        "json" => "json",
        "yml" | "yaml" => "yaml",
        "sh" | "shell" | "bash" => "bash",
        _ => return None,
    };
    Some(grammar)
}

// ── Heuristic classifier ─────────────────────────────────────

/// Weighted pattern rules per language. Each matching pattern adds its
/// weight once; order breaks ties.
const RULES: &[(&str, &[(&str, u32)])] = &[
    (
        "python",
        &[
            (r"(?m)^\s*def\s+\w+\s*\(.*\)\s*(->\s*[\w\[\], ]+)?:\s*$", 4),
            (r"(?m)^\s*from\s+[\w.]+\s+import\s+", 4),
            (r"(?m)^\s*import\s+[\w.]+(\s+as\s+\w+)?\s*$", 1),
            (r"\bprint\s*\(", 2),
            (r"\belif\b", 3),
            (r"\bself\.", 2),
            (r"\b(None|True|False)\b", 1),
            (r#"(?m)^\s*(if|for|while|with|class)\b.*:\s*$"#, 2),
            (r#"__name__\s*==\s*['"]__main__['"]"#, 4),
        ],
    ),
    (
        "typescript",
        &[
            (r":\s*(string|number|boolean|any|void|unknown|never)\b", 3),
            (r"(?m)^\s*(export\s+)?interface\s+\w+", 4),
            (r"(?m)^\s*(export\s+)?type\s+\w+\s*=", 4),
            (r"\bas\s+const\b", 3),
            (r"\b(private|public|readonly)\s+\w+\s*:", 3),
            (r"\w+\s*<[A-Z]\w*(\[\])?>\s*\(", 2),
            (r":\s*React\.FC\b", 4),
        ],
    ),
    (
        "javascript",
        &[
            (r"\b(const|let|var)\s+\w+\s*=", 2),
            (r"=>", 2),
            (r"\bfunction\s*\w*\s*\(", 2),
            (r"\bconsole\.\w+\(", 3),
            (r"===|!==", 2),
            (r"\brequire\s*\(", 2),
            (r"\bexport\s+default\b", 2),
            (r"\b(document|window)\.", 2),
            (r"\bimport\s+.+\s+from\s+['\x22]", 2),
        ],
    ),
    ("json", &[]),
    (
        "php",
        &[
            (r"<\?php", 10),
            (r"\$\w+\s*=", 2),
            (r"\becho\b", 1),
            (r"->\w+\(", 1),
            (r"\bfunction\s+\w+\s*\(\s*\$", 3),
        ],
    ),
    (
        "xml",
        &[
            (r"<\?xml", 10),
            (r"(?i)<!DOCTYPE\s+html", 10),
            (r"(?i)<(html|head|body|div|span|ul|li|table|section)\b[^>]*>", 3),
            (r"</[a-z][\w-]*>", 2),
        ],
    ),
    (
        "css",
        &[
            (r"(?m)^\s*[.#]?[A-Za-z][\w-]*(\s*[,>+~]?\s*[.#:]?[\w-]+)*\s*\{\s*$", 2),
            (r"(?m)^\s*[a-z-]+\s*:\s*[^;{}]+;\s*$", 2),
            (r"@media\b", 4),
            (r"!important", 3),
            (r"\b\d+(px|em|rem|vh|vw)\b", 2),
        ],
    ),
    (
        "sql",
        &[
            (r"(?is)\bselect\b.+\bfrom\b", 4),
            (r"(?i)\binsert\s+into\b", 4),
            (r"(?i)\bcreate\s+table\b", 5),
            (r"(?i)\bupdate\s+\w+\s+set\b", 4),
            (r"(?i)\bwhere\b", 1),
            (r"(?i)\b(inner|left|right)\s+join\b", 3),
        ],
    ),
    (
        "java",
        &[
            (r"\bpublic\s+(static\s+)?(final\s+)?(class|void|interface)\b", 3),
            (r"\bSystem\.out\.print", 5),
            (r"@Override\b", 3),
            (r"(?m)^\s*import\s+java\.", 5),
            (r"\bString\[\]\s+args\b", 3),
        ],
    ),
    (
        "csharp",
        &[
            (r"(?m)^\s*using\s+System", 5),
            (r"(?m)^\s*namespace\s+[\w.]+", 3),
            (r"\bConsole\.Write(Line)?\(", 5),
            (r"\{\s*get;\s*(set;)?\s*\}", 4),
            (r"\bvar\s+\w+\s*=\s*new\b", 2),
        ],
    ),
    (
        "cpp",
        &[
            (r"(?m)^\s*#include\s*[<\x22]", 5),
            (r"\bstd::", 4),
            (r"\bcout\s*<<", 4),
            (r"\bint\s+main\s*\(", 2),
            (r"\bnullptr\b", 3),
            (r"\btemplate\s*<", 3),
        ],
    ),
    (
        "go",
        &[
            (r"(?m)^\s*package\s+\w+\s*$", 4),
            (r"\bfunc\s+(\(\w+\s+\*?\w+\)\s*)?\w+\s*\(", 4),
            (r":=", 2),
            (r"\bfmt\.\w+\(", 4),
            (r"(?m)^\s*import\s+\(", 3),
        ],
    ),
    (
        "ruby",
        &[
            (r"(?m)^\s*def\s+\w+[?!]?(\(.*\))?\s*$", 3),
            (r"(?m)^\s*end\s*$", 2),
            (r"\bputs\b", 3),
            (r"\.each\s+do\b", 4),
            (r"\battr_(accessor|reader|writer)\b", 5),
            (r"(?m)^\s*require\s+['\x22]", 2),
        ],
    ),
    (
        "rust",
        &[
            (r"\bfn\s+\w+\s*[<(]", 4),
            (r"\blet\s+mut\b", 4),
            (r"\b(println|format|vec|panic)!", 4),
            (r"\bimpl\b", 3),
            (r"(?m)^\s*use\s+\w+::", 4),
            (r"&mut\b", 2),
            (r"#\[derive\(", 5),
        ],
    ),
    (
        "yaml",
        &[
            (r"(?m)^---\s*$", 2),
            (r"(?m)^[\w-]+:\s*$", 2),
            (r"(?m)^\s+[\w-]+:\s+\S", 1),
            (r"(?m)^\s*-\s+[\w-]+:\s", 2),
        ],
    ),
    (
        "bash",
        &[
            (r"(?m)^#!\s*/(usr/)?bin/(env\s+)?(ba|z)?sh", 10),
            (r"(?m)^\s*(echo|export|cd|sudo|apt-get|chmod|mkdir)\b", 2),
            (r"\$\{\w+\}|\$\w+", 1),
            (r"(?m)^\s*(fi|done|esac)\s*$", 3),
            (r"\bthen\b", 1),
        ],
    ),
];

/// Minimum score a language needs before its tag is reported.
const MIN_SCORE: u32 = 2;

/// Score awarded when the text is a well-formed JSON object or array.
const JSON_SCORE: u32 = 20;

#[derive(Debug)]
struct LanguageRules {
    tag: &'static str,
    patterns: Vec<(Regex, u32)>,
}

/// Keyword and shape heuristic over the registered language set.
#[derive(Debug)]
pub struct HeuristicClassifier {
    languages: Vec<LanguageRules>,
}

impl HeuristicClassifier {
    /// Compile the rule table.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Other` if a rule pattern fails to compile.
    pub fn new() -> Result<Self, CoreError> {
        let mut languages = Vec::with_capacity(RULES.len());
        for (tag, patterns) in RULES {
            let mut compiled = Vec::with_capacity(patterns.len());
            for (pattern, weight) in *patterns {
                let regex = Regex::new(pattern).map_err(anyhow::Error::from)?;
                compiled.push((regex, *weight));
            }
            languages.push(LanguageRules {
                tag: *tag,
                patterns: compiled,
            });
        }
        Ok(Self { languages })
    }

    /// Tags this classifier can report, in tie-break order.
    pub fn languages(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.languages.iter().map(|l| l.tag)
    }

    fn score(&self, rules: &LanguageRules, text: &str) -> u32 {
        if rules.tag == "json" {
            return if looks_like_json(text) { JSON_SCORE } else { 0 };
        }
        rules
            .patterns
            .iter()
            .filter(|(regex, _)| regex.is_match(text))
            .map(|(_, weight)| weight)
            .sum()
    }
}

impl LanguageClassifier for HeuristicClassifier {
    fn classify(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }

        let mut best: Option<(&'static str, u32)> = None;
        for rules in &self.languages {
            let score = self.score(rules, text);
            trace!(language = rules.tag, score, "scored language");
            if score >= MIN_SCORE && best.is_none_or(|(_, top)| score > top) {
                best = Some((rules.tag, score));
            }
        }
        best.map(|(tag, _)| tag.to_owned())
    }
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return false;
    }
    matches!(
        serde_json::from_str::<serde_json::Value>(text),
        Ok(serde_json::Value::Object(_) | serde_json::Value::Array(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> HeuristicClassifier {
        HeuristicClassifier::new().expect("rules should compile")
    }

    #[test]
    fn test_should_classify_python_print() {
        assert_eq!(classifier().classify("print('hi')").as_deref(), Some("python"));
    }

    #[test]
    fn test_should_classify_common_languages() {
        let c = classifier();
        let cases = [
            ("def add(a, b):\n    return a + b\n", "python"),
            ("const add = (a, b) => a + b;\nconsole.log(add(1, 2));", "javascript"),
            (
                "interface User {\n  name: string;\n}\nconst u: User = { name: 'x' };",
                "typescript",
            ),
            ("fn main() {\n    let mut x = 1;\n    println!(\"{x}\");\n}", "rust"),
            ("package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}", "go"),
            ("SELECT id, name FROM users WHERE id = 1;", "sql"),
            ("#include <iostream>\nint main() { std::cout << 1; }", "cpp"),
            ("<?php\n$name = 'x';\necho $name;", "php"),
            ("{\"a\": 1, \"b\": [true, null]}", "json"),
            ("#!/bin/bash\necho \"hi\"\n", "bash"),
            (
                "public class Main {\n  public static void main(String[] args) {\n    System.out.println(1);\n  }\n}",
                "java",
            ),
            ("using System;\nclass P { static void Main() { Console.WriteLine(1); } }", "csharp"),
            ("class Dog\n  attr_accessor :name\n  def bark\n    puts 'woof'\n  end\nend", "ruby"),
            (".btn {\n  color: red;\n  padding: 4px;\n}", "css"),
            ("<!DOCTYPE html>\n<html><body><div>hi</div></body></html>", "xml"),
        ];

        for (text, expected) in cases {
            assert_eq!(c.classify(text).as_deref(), Some(expected), "text: {text}");
        }
    }

    #[test]
    fn test_should_return_none_for_blank_or_unrecognizable_text() {
        let c = classifier();
        assert!(c.classify("").is_none());
        assert!(c.classify("   \n\t").is_none());
        assert!(c.classify("hello there").is_none());
    }

    #[test]
    fn test_should_detect_component_tags() {
        assert!(has_component_tag("return <MyComponent />;"));
        assert!(has_component_tag("</Layout>"));
        assert!(!has_component_tag("<div></div>"));
        assert!(!has_component_tag("a < B"));
        assert!(!has_component_tag("x <"));
    }

    #[test]
    fn test_should_upgrade_scripting_languages_to_component_variant() {
        let text = "const App = () => <MyComponent />;";
        assert_eq!(refine_component_syntax("javascript".to_owned(), text), "jsx");
        assert_eq!(refine_component_syntax("typescript".to_owned(), text), "tsx");
        assert_eq!(refine_component_syntax("python".to_owned(), text), "python");
        assert_eq!(refine_component_syntax("xml".to_owned(), text), "xml");
        assert_eq!(
            refine_component_syntax("javascript".to_owned(), "const a = 1;"),
            "javascript"
        );
    }

    #[test]
    fn test_should_detect_jsx_through_heuristic_classifier() {
        let text = "import React from 'react';\nconst App = () => {\n  return <MyComponent title=\"x\" />;\n};\nexport default App;";
        let detected = detect_language(&classifier(), text);
        assert_eq!(detected.as_deref(), Some("jsx"));
    }

    #[test]
    fn test_should_map_aliases_to_grammars() {
        assert_eq!(grammar_for("js"), Some("javascript"));
        assert_eq!(grammar_for("jsx"), Some("jsx"));
        assert_eq!(grammar_for("HTML"), Some("markup"));
        assert_eq!(grammar_for("svg"), Some("markup"));
        assert_eq!(grammar_for("cs"), Some("csharp"));
        assert_eq!(grammar_for("yml"), Some("yaml"));
        assert_eq!(grammar_for("shell"), Some("bash"));
        assert_eq!(grammar_for("cobol"), None);
    }

    #[test]
    fn test_should_expose_registered_languages() {
        let c = classifier();
        let tags: Vec<_> = c.languages().collect();
        assert!(tags.contains(&"python"));
        assert!(tags.contains(&"bash"));
        assert_eq!(tags.len(), RULES.len());
    }
}
