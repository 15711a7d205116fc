//! Unified line diff.
//!
//! The edit script comes from Myers' O((N+M)D) algorithm. Grouping into
//! hunks and the `@@` range syntax follow Python's `difflib`, so output
//! reads like `diff -u` without timestamps.

use std::fmt::Write;

/// Context lines around each change, as in `diff -u`.
pub const DEFAULT_CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
    Replace,
}

/// A run of one kind of edit: `a[i1..i2]` becomes `b[j1..j2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Opcode {
    tag: Tag,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
}

/// One step of the shortest edit script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Keep,
    Delete,
    Insert,
}

/// Shortest edit script from `a` to `b`.
fn myers<T: PartialEq>(a: &[T], b: &[T]) -> Vec<Edit> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = (n + m) as usize;
    let offset = max as isize + 1;
    let mut v = vec![0isize; 2 * max + 3];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=max as isize {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let index = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[index - 1] < v[index + 1]) {
                v[index + 1]
            } else {
                v[index - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[index] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    // Walk the saved frontiers backwards from (n, m).
    let mut edits = Vec::with_capacity(max);
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let index = (k + offset) as usize;
        let prev_k = if k == -d || (k != d && v[index - 1] < v[index + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;
        while x > prev_x && y > prev_y {
            edits.push(Edit::Keep);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                edits.push(Edit::Insert);
            } else {
                edits.push(Edit::Delete);
            }
        }
        x = prev_x;
        y = prev_y;
    }
    edits.reverse();
    edits
}

/// Collapse an edit script into runs, pairing adjacent deletions and
/// insertions into replacements.
fn opcodes(edits: &[Edit]) -> Vec<Opcode> {
    let mut codes: Vec<Opcode> = Vec::new();
    let (mut i, mut j) = (0, 0);
    for edit in edits {
        let (tag, di, dj) = match edit {
            Edit::Keep => (Tag::Equal, 1, 1),
            Edit::Delete => (Tag::Delete, 1, 0),
            Edit::Insert => (Tag::Insert, 0, 1),
        };
        match codes.last_mut() {
            Some(last) if last.tag == tag || (last.tag == Tag::Replace && tag != Tag::Equal) => {
                last.i2 += di;
                last.j2 += dj;
            }
            Some(last)
                if matches!(
                    (last.tag, tag),
                    (Tag::Delete, Tag::Insert) | (Tag::Insert, Tag::Delete)
                ) =>
            {
                last.tag = Tag::Replace;
                last.i2 += di;
                last.j2 += dj;
            }
            _ => codes.push(Opcode {
                tag,
                i1: i,
                i2: i + di,
                j1: j,
                j2: j + dj,
            }),
        }
        i += di;
        j += dj;
    }
    codes
}

/// Split opcodes into hunks with at most `context` equal lines on each
/// side of a change.
fn grouped(mut codes: Vec<Opcode>, context: usize) -> Vec<Vec<Opcode>> {
    if codes.is_empty() {
        return Vec::new();
    }
    if let Some(first) = codes.first_mut()
        && first.tag == Tag::Equal
    {
        first.i1 = first.i1.max(first.i2.saturating_sub(context));
        first.j1 = first.j1.max(first.j2.saturating_sub(context));
    }
    if let Some(last) = codes.last_mut()
        && last.tag == Tag::Equal
    {
        last.i2 = last.i2.min(last.i1 + context);
        last.j2 = last.j2.min(last.j1 + context);
    }

    let mut groups = Vec::new();
    let mut group = Vec::new();
    for mut code in codes {
        if code.tag == Tag::Equal && code.i2 - code.i1 > 2 * context {
            group.push(Opcode {
                i2: code.i2.min(code.i1 + context),
                j2: code.j2.min(code.j1 + context),
                ..code
            });
            groups.push(std::mem::take(&mut group));
            code.i1 = code.i1.max(code.i2.saturating_sub(context));
            code.j1 = code.j1.max(code.j2.saturating_sub(context));
        }
        group.push(code);
    }
    if !(group.len() == 1 && group[0].tag == Tag::Equal) {
        groups.push(group);
    }
    groups
}

/// `difflib`'s hunk range: `start,length`, 1-based, with a bare start for
/// single lines and the line before for empty ranges.
fn range(start: usize, stop: usize) -> String {
    let length = stop - start;
    let beginning = start + 1;
    match length {
        1 => beginning.to_string(),
        0 => format!("{},0", beginning - 1),
        _ => format!("{beginning},{length}"),
    }
}

/// Unified diff of two line sequences, or `""` when they are equal.
///
/// Lines are given without terminators; every output line ends in `\n`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn unified_diff<S: AsRef<str> + PartialEq>(
    a: &[S],
    b: &[S],
    label_a: &str,
    label_b: &str,
    context: usize,
) -> String {
    let groups = grouped(opcodes(&myers(a, b)), context);
    if groups.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let _ = writeln!(out, "--- {label_a}");
    let _ = writeln!(out, "+++ {label_b}");
    for group in groups {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let _ = writeln!(
            out,
            "@@ -{} +{} @@",
            range(first.i1, last.i2),
            range(first.j1, last.j2)
        );
        for code in &group {
            if code.tag == Tag::Equal {
                for line in &a[code.i1..code.i2] {
                    let _ = writeln!(out, " {}", line.as_ref());
                }
                continue;
            }
            if matches!(code.tag, Tag::Replace | Tag::Delete) {
                for line in &a[code.i1..code.i2] {
                    let _ = writeln!(out, "-{}", line.as_ref());
                }
            }
            if matches!(code.tag, Tag::Replace | Tag::Insert) {
                for line in &b[code.j1..code.j2] {
                    let _ = writeln!(out, "+{}", line.as_ref());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn identical_inputs_give_nothing() {
        let a = lines("a\nb\nc");
        assert_eq!(unified_diff(&a, &a, "a", "b", 3), "");
        let empty: Vec<&str> = Vec::new();
        assert_eq!(unified_diff(&empty, &empty, "a", "b", 3), "");
    }

    #[test]
    fn single_replacement() {
        let a = lines("one\ntwo\nthree");
        let b = lines("one\n2\nthree");
        assert_eq!(
            unified_diff(&a, &b, "a", "b", 3),
            "--- a\n+++ b\n@@ -1,3 +1,3 @@\n one\n-two\n+2\n three\n"
        );
    }

    #[test]
    fn insertion_into_empty() {
        let a: Vec<&str> = Vec::new();
        let b = lines("x");
        assert_eq!(unified_diff(&a, &b, "a", "b", 3), "--- a\n+++ b\n@@ -0,0 +1 @@\n+x\n");
    }

    #[test]
    fn distant_changes_split_into_hunks() {
        let a: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        let mut b = a.clone();
        b[1] = "one".into();
        b[18] = "eighteen".into();
        let diff = unified_diff(&a, &b, "a", "b", 3);
        assert_eq!(diff.matches("@@ -").count(), 2);
        assert!(diff.contains("@@ -1,5 +1,5 @@\n"));
        assert!(diff.contains("@@ -16,5 +16,5 @@\n"));
    }

    #[test]
    fn context_zero() {
        let a = lines("a\nb\nc");
        let b = lines("a\nc");
        assert_eq!(
            unified_diff(&a, &b, "x", "y", 0),
            "--- x\n+++ y\n@@ -2 +1,0 @@\n-b\n"
        );
    }

    #[test]
    fn edit_script_is_minimal() {
        let a: Vec<char> = "abcabba".chars().collect();
        let b: Vec<char> = "cbabac".chars().collect();
        let edits = myers(&a, &b);
        let changes = edits.iter().filter(|e| **e != Edit::Keep).count();
        assert_eq!(changes, 5);
        let keeps = edits.iter().filter(|e| **e == Edit::Keep).count();
        assert_eq!(keeps, 4);
    }

    #[test]
    fn ranges() {
        assert_eq!(range(0, 1), "1");
        assert_eq!(range(0, 0), "0,0");
        assert_eq!(range(4, 4), "4,0");
        assert_eq!(range(2, 6), "3,4");
    }
}
