//! Transport detection from a connect URL (§4.10, §6 config rules).

/// Which wire transport a connection uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// `http(s)://` — plain request/response, one tool call per HTTP request.
    Http,
    /// `sse://` or `http+sse://` — server-sent-events streaming transport.
    Sse,
    /// Anything else: a shell command line to spawn and speak JSON-RPC over stdio.
    Stdio { command: Vec<String> },
}

/// Detects the transport for `url` per §4.10: `http(s)://` is plain HTTP,
/// `sse://`/`http+sse://` is SSE, anything else is tokenised as a stdio command.
pub fn detect(url: &str) -> Transport {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Transport::Http
    } else if lower.starts_with("sse://") || lower.starts_with("http+sse://") {
        Transport::Sse
    } else {
        Transport::Stdio {
            command: tokenize_command(url),
        }
    }
}

/// Splits a shell-like command line into argv, honoring single/double quotes.
/// Not a full shell grammar: no variable expansion, no escaped quotes inside
/// a quoted segment.
fn tokenize_command(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in command.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
            }
            Some(_) => current.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}
