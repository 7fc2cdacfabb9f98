//! A small preprocessor and token-aware identifier rewriting for WGSL chunks.
//!
//! WGSL has no preprocessor, so effect code uses a minimal C-style subset that is
//! evaluated on the CPU before compilation:
//!
//! | Directive            | Active when                                  |
//! |----------------------|----------------------------------------------|
//! | `#ifdef NAME`        | `NAME` is defined                            |
//! | `#ifndef NAME`       | `NAME` is not defined                        |
//! | `#if NAME`           | `NAME` is defined and not `0`/`false`        |
//! | `#if defined(NAME)`  | same as `#ifdef`                             |
//! | `#else` / `#endif`   | closes or flips the innermost block          |
//!
//! Renaming works on tokens, not raw text: comments are preserved verbatim, number
//! literals are never split and member accesses (`color.rgb`) are never renamed.

use std::collections::HashMap;

use crate::error::ComposeError;
use crate::material::Defines;

struct Block {
    parent_active: bool,
    condition: bool,
    in_else: bool,
}

impl Block {
    fn active(&self) -> bool {
        self.parent_active && (self.condition != self.in_else)
    }
}

/// Strips inactive conditional blocks from `source` given `defines`.
pub fn evaluate(label: &str, source: &str, defines: &Defines) -> Result<String, ComposeError> {
    let error = |line: usize, reason: &str| ComposeError::Preprocess {
        source_label: label.to_string(),
        line,
        reason: reason.to_string(),
    };

    let mut out = String::with_capacity(source.len());
    let mut stack: Vec<Block> = Vec::new();
    let active = |stack: &[Block]| stack.last().is_none_or(Block::active);

    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim_start();
        let Some(directive) = trimmed.strip_prefix('#') else {
            if active(&stack) {
                out.push_str(line);
                out.push('\n');
            }
            continue;
        };

        let mut parts = directive.split_whitespace();
        let keyword = parts.next().unwrap_or_default();
        let argument = parts.next();
        match keyword {
            "ifdef" | "ifndef" | "if" => {
                let name = argument.ok_or_else(|| error(line_no, "missing condition"))?;
                let condition = match keyword {
                    "ifdef" => defines.contains_key(name),
                    "ifndef" => !defines.contains_key(name),
                    _ => condition_holds(name, defines),
                };
                stack.push(Block {
                    parent_active: active(&stack),
                    condition,
                    in_else: false,
                });
            }
            "else" => {
                let block = stack
                    .last_mut()
                    .ok_or_else(|| error(line_no, "#else without #if"))?;
                if block.in_else {
                    return Err(error(line_no, "duplicate #else"));
                }
                block.in_else = true;
            }
            "endif" => {
                stack
                    .pop()
                    .ok_or_else(|| error(line_no, "#endif without #if"))?;
            }
            other => {
                return Err(error(line_no, &format!("unsupported directive #{other}")));
            }
        }
    }

    if !stack.is_empty() {
        return Err(error(source.lines().count(), "unterminated conditional block"));
    }
    Ok(out)
}

fn condition_holds(expr: &str, defines: &Defines) -> bool {
    if let Some(name) = expr
        .strip_prefix("defined(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return defines.contains_key(name);
    }
    defines
        .get(expr)
        .is_some_and(|value| value != "0" && value != "false")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Comment,
    Space,
    Punct,
}

#[derive(Clone, Copy, Debug)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        let kind = if source[i..].starts_with("//") {
            i = source[i..].find('\n').map_or(bytes.len(), |n| i + n);
            TokenKind::Comment
        } else if source[i..].starts_with("/*") {
            i = source[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
            TokenKind::Comment
        } else if is_ident_start(c) {
            while i < bytes.len() && is_ident_continue(bytes[i] as char) {
                i += 1;
            }
            TokenKind::Ident
        } else if c.is_ascii_digit() {
            while i < bytes.len() && (is_ident_continue(bytes[i] as char) || bytes[i] == b'.') {
                i += 1;
            }
            TokenKind::Number
        } else if c.is_ascii_whitespace() {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            TokenKind::Space
        } else {
            i += source[i..].chars().next().map_or(1, char::len_utf8);
            TokenKind::Punct
        };
        tokens.push(Token {
            kind,
            text: &source[start..i],
        });
    }
    tokens
}

/// Replaces identifiers found in `renames`.
///
/// Member accesses are left alone, and so are names bound locally: function
/// parameters, `let`/`var`/`const` declarations inside a body and struct fields. A
/// local binding shadows a rename from the end of its declaration to the end of the
/// enclosing block.
pub fn rename_identifiers(source: &str, renames: &HashMap<String, String>) -> String {
    let tokens = tokenize(source);
    let next_significant = |from: usize| {
        tokens[from..]
            .iter()
            .find(|t| !matches!(t.kind, TokenKind::Space | TokenKind::Comment))
            .map(|t| t.text)
    };

    let mut out = String::with_capacity(source.len() + source.len() / 4);
    // Locally bound names per open block. The first entry is module scope.
    let mut scopes: Vec<Vec<&str>> = vec![Vec::new()];
    // Parenthesis depth while inside a function header.
    let mut header: Option<u32> = None;
    let mut params: Vec<&str> = Vec::new();
    let mut struct_header = false;
    let mut in_struct = false;
    // Waiting for a local binding name; `true` inside `var<...>`.
    let mut binding: Option<bool> = None;
    let mut pending: Vec<&str> = Vec::new();
    let mut prev = "";

    for (index, token) in tokens.iter().enumerate() {
        if matches!(token.kind, TokenKind::Space | TokenKind::Comment) {
            out.push_str(token.text);
            continue;
        }
        let text = token.text;
        let mut keep = prev == ".";
        match token.kind {
            TokenKind::Ident => match text {
                "fn" => {
                    header = Some(0);
                    params.clear();
                }
                "struct" => struct_header = true,
                "let" | "var" | "const" if scopes.len() > 1 && !in_struct => binding = Some(false),
                _ if binding == Some(false) => {
                    pending.push(text);
                    binding = None;
                    keep = true;
                }
                _ if (in_struct || header == Some(1)) && next_significant(index + 1) == Some(":") => {
                    if header.is_some() {
                        params.push(text);
                    }
                    keep = true;
                }
                _ => keep |= scopes.iter().any(|scope| scope.contains(&text)),
            },
            TokenKind::Punct => match text {
                "<" if binding.is_some() => binding = Some(true),
                ">" if binding.is_some() => binding = Some(false),
                "(" => {
                    if let Some(depth) = header.as_mut() {
                        *depth += 1;
                    }
                }
                ")" => {
                    if let Some(depth) = header.as_mut() {
                        *depth = depth.saturating_sub(1);
                    }
                }
                ";" => {
                    if let Some(scope) = scopes.last_mut() {
                        scope.append(&mut pending);
                    }
                }
                "{" => {
                    in_struct = std::mem::take(&mut struct_header);
                    let mut scope = Vec::new();
                    if header.take().is_some() {
                        scope.append(&mut params);
                    }
                    scopes.push(scope);
                }
                "}" => {
                    in_struct = false;
                    if scopes.len() > 1 {
                        scopes.pop();
                    }
                }
                _ => {}
            },
            _ => {}
        }

        match renames.get(text) {
            Some(replacement) if token.kind == TokenKind::Ident && !keep => out.push_str(replacement),
            _ => out.push_str(text),
        }
        prev = text;
    }
    out
}

/// Names declared at module scope: functions, constants, private variables,
/// structs and aliases.
pub fn declared_names(source: &str) -> Vec<String> {
    let tokens: Vec<Token<'_>> = tokenize(source)
        .into_iter()
        .filter(|t| !matches!(t.kind, TokenKind::Space | TokenKind::Comment))
        .collect();

    let mut names = Vec::new();
    let mut depth = 0i32;
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        match (token.kind, token.text) {
            (TokenKind::Punct, "{") => depth += 1,
            (TokenKind::Punct, "}") => depth -= 1,
            (TokenKind::Ident, "fn" | "const" | "struct" | "alias" | "override" | "var")
                if depth == 0 =>
            {
                let mut j = i + 1;
                // Skip an address space qualifier such as `var<private>`.
                if token.text == "var" && tokens.get(j).is_some_and(|t| t.text == "<") {
                    while j < tokens.len() && tokens[j].text != ">" {
                        j += 1;
                    }
                    j += 1;
                }
                if let Some(name) = tokens.get(j).filter(|t| t.kind == TokenKind::Ident) {
                    names.push(name.text.to_string());
                }
                i = j;
            }
            _ => {}
        }
        i += 1;
    }
    names
}

/// Whether `source` declares a module-scope function named `name`.
pub fn declares_function(source: &str, name: &str) -> bool {
    let tokens: Vec<Token<'_>> = tokenize(source)
        .into_iter()
        .filter(|t| !matches!(t.kind, TokenKind::Space | TokenKind::Comment))
        .collect();
    tokens
        .windows(2)
        .any(|pair| pair[0].text == "fn" && pair[1].text == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defines(pairs: &[(&str, &str)]) -> Defines {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ifdef_else_selects_branch() {
        let source = "a\n#ifdef FLAG\nb\n#else\nc\n#endif\nd\n";
        assert_eq!(evaluate("t", source, &defines(&[])).unwrap(), "a\nc\nd\n");
        assert_eq!(
            evaluate("t", source, &defines(&[("FLAG", "")])).unwrap(),
            "a\nb\nd\n"
        );
    }

    #[test]
    fn nested_blocks_respect_parent() {
        let source = "#ifdef A\n#ifndef B\nx\n#endif\n#endif\n";
        assert_eq!(evaluate("t", source, &defines(&[])).unwrap(), "");
        assert_eq!(evaluate("t", source, &defines(&[("A", "")])).unwrap(), "x\n");
        assert_eq!(
            evaluate("t", source, &defines(&[("A", ""), ("B", "")])).unwrap(),
            ""
        );
    }

    #[test]
    fn if_checks_value() {
        let source = "#if MODE\non\n#endif\n#if defined(MODE)\ndef\n#endif\n";
        assert_eq!(
            evaluate("t", source, &defines(&[("MODE", "0")])).unwrap(),
            "def\n"
        );
        assert_eq!(
            evaluate("t", source, &defines(&[("MODE", "2")])).unwrap(),
            "on\ndef\n"
        );
    }

    #[test]
    fn unbalanced_directives_fail() {
        let err = evaluate("t", "#ifdef A\nx\n", &Defines::new()).unwrap_err();
        assert!(matches!(err, ComposeError::Preprocess { .. }));
        assert!(evaluate("t", "#endif\n", &Defines::new()).is_err());
        assert!(evaluate("t", "#define A 1\n", &Defines::new()).is_err());
    }

    #[test]
    fn rename_skips_members_and_comments_are_kept() {
        let renames: HashMap<String, String> = [
            ("intensity".to_string(), "u.e0_intensity".to_string()),
            ("rgb".to_string(), "broken".to_string()),
        ]
        .into_iter()
        .collect();
        let out = rename_identifiers(
            "// intensity\nlet c = color.rgb * intensity + 1.0e2;",
            &renames,
        );
        assert_eq!(out, "// intensity\nlet c = color.rgb * u.e0_intensity + 1.0e2;");
    }

    #[test]
    fn local_bindings_shadow_renames() {
        let renames: HashMap<String, String> = [
            ("time".to_string(), "u.time".to_string()),
            ("speed".to_string(), "u.e0_speed".to_string()),
            ("wave".to_string(), "e0_wave".to_string()),
        ]
        .into_iter()
        .collect();
        let source = "fn wave(uv: vec2f, speed: f32) -> f32 {\n    let time = time * speed;\n    return sin(uv.x + time);\n}\nfn other() -> f32 { return time * speed; }\n";
        let out = rename_identifiers(source, &renames);
        assert_eq!(
            out,
            "fn e0_wave(uv: vec2f, speed: f32) -> f32 {\n    let time = u.time * speed;\n    return sin(uv.x + time);\n}\nfn other() -> f32 { return u.time * u.e0_speed; }\n"
        );
    }

    #[test]
    fn struct_fields_and_typed_vars_are_not_renamed() {
        let renames: HashMap<String, String> = [
            ("time".to_string(), "u.time".to_string()),
            ("Pulse".to_string(), "e1_Pulse".to_string()),
        ]
        .into_iter()
        .collect();
        let source = "struct Pulse { time: f32 }\nfn f() -> f32 {\n    var<function> time: f32 = 1.0;\n    return Pulse(time).time;\n}\n";
        let out = rename_identifiers(source, &renames);
        assert_eq!(
            out,
            "struct e1_Pulse { time: f32 }\nfn f() -> f32 {\n    var<function> time: f32 = 1.0;\n    return e1_Pulse(time).time;\n}\n"
        );
    }

    #[test]
    fn collects_module_scope_declarations() {
        let source = r#"
            const SCALE = 2.0;
            var<private> support: vec4f;
            struct Tap { offset: vec2f }
            fn helper(x: f32) -> f32 { let inner = x; return inner; }
            fn mainImage(input_color: vec4f, uv: vec2f) -> vec4f { return input_color; }
        "#;
        assert_eq!(
            declared_names(source),
            vec!["SCALE", "support", "Tap", "helper", "mainImage"]
        );
        assert!(declares_function(source, "mainImage"));
        assert!(!declares_function(source, "mainUv"));
    }
}
