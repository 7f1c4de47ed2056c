//! Remote path segments derived from display titles.

use super::SubgroupRole;

/// Turn an arbitrary title into a remote-safe path segment.
///
/// Lowercases, replaces everything outside `[a-zA-Z0-9_.-]` with `_` and strips
/// separator characters from both ends. Total and idempotent.
///
/// Unlike the derived subgroup and assignment paths, which only trim `-` and `.`,
/// edge `_` is stripped here too, so `"Intro to Systems!!"` yields
/// `intro_to_systems` rather than `intro_to_systems__`.
pub fn sanitize(title: &str) -> String {
    let replaced: String = title
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    replaced
        .trim_matches(|c| matches!(c, '-' | '.' | '_'))
        .to_string()
}

fn trim_path_edges(path: &str) -> String {
    path.trim_matches(|c| matches!(c, '-' | '.')).to_string()
}

/// Path of a classroom's role subgroup, e.g. `systems_MEMBERS`.
pub fn subgroup_path(parent_path: &str, role: SubgroupRole) -> String {
    trim_path_edges(&format!("{}_{}", parent_path, role.name()))
}

/// Path of an assignment group under the ASSIGNMENTS subgroup.
pub fn assignment_group_path(assignments_group_name: &str, sanitized_title: &str) -> String {
    trim_path_edges(&format!("{}_{}", assignments_group_name, sanitized_title))
}

/// Name (and path) of a student's fork inside an assignment group.
pub fn fork_project_name(assignment_group_name: &str, username: &str) -> String {
    format!("{}_{}_project", assignment_group_name, username)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "Intro to Systems!!",
        "",
        "   ",
        "...--hidden--...",
        "Ünïcödé Kurs 2024",
        "C++ & Rust: a/b\\c",
        "already_safe-path.v2",
        "__leading and trailing__",
        "emoji 🚀 launch",
        "-.-",
    ];

    fn is_path_safe(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    }

    #[test]
    fn test_classroom_title_scenario() {
        let path = sanitize("Intro to Systems!!");
        assert_eq!(path, "intro_to_systems");
        assert_eq!(
            subgroup_path(&path, SubgroupRole::Members),
            "intro_to_systems_MEMBERS"
        );
        assert_eq!(
            subgroup_path(&path, SubgroupRole::Assignments),
            "intro_to_systems_ASSIGNMENTS"
        );
    }

    #[test]
    fn test_output_charset_and_edges() {
        for sample in SAMPLES {
            let out = sanitize(sample);
            assert!(is_path_safe(&out), "{sample:?} -> {out:?}");
            assert!(!out.starts_with(['-', '.']), "{sample:?} -> {out:?}");
            assert!(!out.ends_with(['-', '.']), "{sample:?} -> {out:?}");
        }
    }

    #[test]
    fn test_idempotent() {
        for sample in SAMPLES {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "{sample:?}");
        }
    }

    #[test]
    fn test_non_ascii_replaced_per_character() {
        assert_eq!(sanitize("Ab ÄÖ"), "ab");
        assert_eq!(sanitize("x€y"), "x_y");
    }

    #[test]
    fn test_assignment_and_fork_names() {
        assert_eq!(assignment_group_path("ASSIGNMENTS", "lab_1"), "ASSIGNMENTS_lab_1");
        assert_eq!(fork_project_name("lab_1", "alice"), "lab_1_alice_project");
    }
}
