// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Splits `payload` into consecutive slices of at most `max_size` bytes.
///
/// Slices always end on a `char` boundary. A character wider than
/// `max_size` is emitted alone rather than producing an empty slice, so the
/// result is total for any `max_size` (zero behaves like one). Joining the
/// slices in order yields `payload` again; an empty payload yields nothing.
///
/// ```
/// use azure_blob_logs::chunk::split;
///
/// assert_eq!(split("abcde", 2), vec!["ab", "cd", "e"]);
/// assert!(split("", 4).is_empty());
/// ```
#[must_use]
pub fn split(payload: &str, max_size: usize) -> Vec<&str> {
    let max_size = max_size.max(1);
    let mut chunks = Vec::with_capacity(payload.len() / max_size + 1);
    let mut rest = payload;

    while !rest.is_empty() {
        if rest.len() <= max_size {
            chunks.push(rest);
            break;
        }

        let mut end = max_size;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // the leading char alone is wider than max_size
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }

    chunks
}
