//! Line-level diffing between two prompt versions.
//!
//! Longest Common Subsequence alignment over lines; rendering to text
//! stays at the CLI edge.

/// One line of a structured diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    /// Present in both versions.
    Context(String),
    /// Only in the old version.
    Removed(String),
    /// Only in the new version.
    Added(String),
}

/// Diff `old` against `new`, line by line.
pub fn diff_lines(old: &str, new: &str) -> Vec<DiffLine> {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let alignment = lcs_alignment(&old_lines, &new_lines);

    let mut out = Vec::new();
    let mut i = 0;
    let mut j = 0;
    for (ai, bj) in alignment {
        while i < ai {
            out.push(DiffLine::Removed(old_lines[i].to_string()));
            i += 1;
        }
        while j < bj {
            out.push(DiffLine::Added(new_lines[j].to_string()));
            j += 1;
        }
        out.push(DiffLine::Context(old_lines[ai].to_string()));
        i = ai + 1;
        j = bj + 1;
    }
    while i < old_lines.len() {
        out.push(DiffLine::Removed(old_lines[i].to_string()));
        i += 1;
    }
    while j < new_lines.len() {
        out.push(DiffLine::Added(new_lines[j].to_string()));
        j += 1;
    }
    out
}

/// True when the diff contains no additions or removals.
pub fn is_identical(diff: &[DiffLine]) -> bool {
    diff.iter().all(|l| matches!(l, DiffLine::Context(_)))
}

/// LCS alignment as (index_old, index_new) pairs of matching lines,
/// in ascending order.
fn lcs_alignment(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let m = a.len();
    let n = b.len();
    if m == 0 || n == 0 {
        return Vec::new();
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            if a[i - 1] == b[j - 1] {
                dp[i][j] = dp[i - 1][j - 1] + 1;
            } else {
                dp[i][j] = dp[i][j - 1].max(dp[i - 1][j]);
            }
        }
    }

    let mut alignment = Vec::new();
    let mut i = m;
    let mut j = n;
    while i > 0 && j > 0 {
        if a[i - 1] == b[j - 1] {
            alignment.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if dp[i][j - 1] > dp[i - 1][j] {
            j -= 1;
        } else {
            i -= 1;
        }
    }
    alignment.reverse();
    alignment
}
