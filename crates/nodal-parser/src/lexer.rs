//! Netlist line preprocessing: title, comments, continuations.

/// One logical netlist line after preprocessing, with the number of the
/// (first) physical line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalLine {
    pub number: usize,
    pub text: String,
}

/// Split raw netlist text into the title and logical statement lines.
///
/// - The first line is the title.
/// - Lines starting with `*` are comments; a `*` mid-line ends the line.
/// - Lines starting with `+` continue the previous logical line.
pub fn logical_lines(input: &str) -> (String, Vec<LogicalLine>) {
    let mut lines = input.lines().enumerate();
    let title = lines
        .next()
        .map(|(_, l)| l.trim().to_string())
        .unwrap_or_default();

    let mut out: Vec<LogicalLine> = Vec::new();
    for (idx, raw) in lines {
        let number = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('*') {
            continue;
        }

        // A mid-line '*' starts a trailing comment.
        let content = match trimmed.find('*') {
            Some(pos) => trimmed[..pos].trim_end(),
            None => trimmed,
        };
        if content.is_empty() {
            continue;
        }

        if let Some(rest) = content.strip_prefix('+') {
            if let Some(last) = out.last_mut() {
                last.text.push(' ');
                last.text.push_str(rest.trim());
                continue;
            }
        }

        out.push(LogicalLine {
            number,
            text: content.to_string(),
        });
    }

    (title, out)
}

/// Tokenize a logical line. Parenthesized groups like `SIN(0 5 1k)` are
/// flattened into a marker token followed by their arguments, so
/// `SIN(0 5 1k)` becomes `SIN(`, `0`, `5`, `1k`, `)`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        match c {
            '(' => {
                current.push('(');
                tokens.push(std::mem::take(&mut current));
            }
            ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(")".to_string());
            }
            ' ' | '\t' | ',' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_and_comments() {
        let text = "My circuit\n* a comment\nR1 1 0 1k\n\nV1 1 0 DC 5 * trailing\n";
        let (title, lines) = logical_lines(text);
        assert_eq!(title, "My circuit");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "R1 1 0 1k");
        assert_eq!(lines[1].text, "V1 1 0 DC 5");
    }

    #[test]
    fn test_continuation() {
        let text = "t\nV1 1 0 PULSE(0 5\n+ 0 1n 1n 1u 2u)\n";
        let (_, lines) = logical_lines(text);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "V1 1 0 PULSE(0 5 0 1n 1n 1u 2u)");
    }

    #[test]
    fn test_tokenize_groups() {
        let tokens = tokenize("V1 1 0 SIN(0 5 1k)");
        assert_eq!(tokens, vec!["V1", "1", "0", "SIN(", "0", "5", "1k", ")"]);
    }

    #[test]
    fn test_tokenize_model_params() {
        let tokens = tokenize(".model D1N4148 D(is=2.52e-9 n=1.752)");
        assert_eq!(
            tokens,
            vec![".model", "D1N4148", "D(", "is=2.52e-9", "n=1.752", ")"]
        );
    }
}
