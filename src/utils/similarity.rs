use std::collections::HashSet;

/// Line-overlap ratio in [0, 1] between two response bodies.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b { return 1.0; }

    let b_lines: HashSet<&str> = b.lines().collect();
    let a_count = a.lines().count();
    let total = a_count.max(b.lines().count());
    if total == 0 { return 1.0; }

    let common = a.lines().filter(|l| b_lines.contains(l)).count();
    common as f64 / total as f64
}
