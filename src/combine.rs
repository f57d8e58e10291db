//! Combined program synthesis
//!
//! Builds the single program handed to the runtime from the active fragments.
//! Output depends only on the fragments (in order) and the pending tempo
//! directive, never on how the session got there.

/// Name of the runtime call that plays its arguments in parallel
pub const PARALLEL_CALL: &str = "stack";

/// Combine fragments into one program
///
/// - no fragments: `None` (the caller silences the runtime instead)
/// - one fragment: the fragment verbatim
/// - several: each fragment wrapped in parentheses, joined as arguments of
///   `stack(..)`, one per line
///
/// A directive, when given, is emitted first on its own line.
pub fn combine_program<'a, I>(fragments: I, directive: Option<&str>) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let fragments: Vec<&str> = fragments.into_iter().collect();

    let body = match fragments.as_slice() {
        [] => return None,
        [single] => single.to_string(),
        many => {
            let args: Vec<String> = many.iter().map(|f| wrap_fragment(f)).collect();
            format!("{}(\n{}\n)", PARALLEL_CALL, args.join(",\n"))
        }
    };

    Some(match directive {
        Some(directive) => format!("{}\n{}", directive, body),
        None => body,
    })
}

/// Parenthesize one fragment so its operators cannot leak into the call
fn wrap_fragment(fragment: &str) -> String {
    let trimmed = fragment.trim().trim_end_matches(';').trim_end();
    let indented = trimmed.replace('\n', "\n  ");

    // A trailing line comment would swallow the closing paren
    let last_line = trimmed.lines().last().unwrap_or("");
    if last_line.contains("//") {
        format!("  ({}\n  )", indented)
    } else {
        format!("  ({})", indented)
    }
}
