//! Java adapter.
//!
//! javac requires a public class to live in a file of the same name, so the
//! class name is recovered with a plain text scan for the first
//! `public class` declaration. This is deliberately not a parser: it only
//! picks the file name, and anything unusual falls back to `Main`.

use super::{BuildPlan, Toolchain};
use crate::executor::{ExecutionError, Invocation, Language, Phase, Workspace, WorkspaceKind};

const DEFAULT_CLASS: &str = "Main";
const MARKER: &str = "public class";

/// Java toolchain
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaToolchain;

/// Name of the first `public class` declared in `source`, or `Main`
#[must_use]
pub fn extract_public_class(source: &str) -> String {
    for (start, _) in source.match_indices(MARKER) {
        let preceded_by_boundary = source[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_identifier_char(c));
        let after = &source[start + MARKER.len()..];
        if !preceded_by_boundary || !after.starts_with(char::is_whitespace) {
            continue;
        }
        let name: String = after
            .trim_start()
            .chars()
            .take_while(|&c| is_identifier_char(c))
            .collect();
        // Only the first declaration counts, valid or not.
        return if is_java_identifier(&name) {
            name
        } else {
            DEFAULT_CLASS.to_string()
        };
    }
    DEFAULT_CLASS.to_string()
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_java_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(is_identifier_char)
}

impl Toolchain for JavaToolchain {
    fn language(&self) -> Language {
        Language::Java
    }

    fn workspace_kind(&self) -> WorkspaceKind {
        WorkspaceKind::Directory
    }

    fn missing_message(&self) -> &'static str {
        "Java compiler not found. Please install JDK to run Java code."
    }

    fn version_probe(&self) -> Invocation {
        Invocation::new(["javac", "-version"])
    }

    fn materialize(
        &self,
        workspace: &Workspace,
        source: &str,
    ) -> Result<BuildPlan, ExecutionError> {
        let class_name = extract_public_class(source);
        let file_name = format!("{class_name}.java");
        workspace.write_file(&file_name, source)?;

        let working_dir = workspace.working_dir().to_path_buf();
        Ok(BuildPlan {
            compile: Some(Invocation::new(["javac".to_string(), file_name])),
            run: Invocation::new([
                "java".to_string(),
                "-cp".to_string(),
                working_dir.to_string_lossy().into_owned(),
                class_name,
            ]),
            working_dir,
            run_deadline: Phase::Run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extracts_declared_class() {
        let source = "import java.util.*;\n\npublic class Solver {\n  public static void main(String[] a) {}\n}\n";
        assert_eq!(extract_public_class(source), "Solver");
    }

    #[test]
    fn test_brace_attached_to_name() {
        assert_eq!(extract_public_class("public class Solver{}"), "Solver");
    }

    #[test]
    fn test_falls_back_to_main() {
        assert_eq!(extract_public_class("class Hidden { }"), "Main");
        assert_eq!(extract_public_class(""), "Main");
    }

    #[test]
    fn test_first_declaration_wins() {
        let source = "public class First {}\npublic class Second {}";
        assert_eq!(extract_public_class(source), "First");
    }

    #[test]
    fn test_marker_inside_longer_word_is_ignored() {
        assert_eq!(
            extract_public_class("// notpublic class X\npublic class Real {}"),
            "Real"
        );
        assert_eq!(extract_public_class("public classy Thing"), "Main");
    }

    #[test]
    fn test_boundary_checked_against_preceding_source() {
        // The second marker is glued to the first one's trailing "s".
        assert_eq!(extract_public_class("xpublic classpublic class Y"), "Main");
        assert_eq!(extract_public_class("apublic class X\npublic class B"), "B");
        assert_eq!(extract_public_class("public classpublic class Z"), "Main");
    }

    #[test]
    fn test_invalid_identifier_falls_back() {
        assert_eq!(extract_public_class("public class 9Lives {}"), "Main");
        assert_eq!(extract_public_class("public class ../../etc {}"), "Main");
    }

    #[test]
    fn test_materialize_names_file_after_class() {
        let ws = Workspace::create(WorkspaceKind::Directory, None).unwrap();
        let plan = JavaToolchain
            .materialize(&ws, "public class Solver { }")
            .unwrap();

        assert!(ws.path().join("Solver.java").exists());
        let compile = plan.compile.unwrap();
        assert_eq!(compile.argv, vec!["javac", "Solver.java"]);
        assert_eq!(plan.run.argv.last().map(String::as_str), Some("Solver"));
        assert_eq!(plan.working_dir, ws.path());
    }

    #[test]
    fn test_materialize_without_public_class_uses_main() {
        let ws = Workspace::create(WorkspaceKind::Directory, None).unwrap();
        JavaToolchain
            .materialize(&ws, "class Helper {}")
            .unwrap();
        assert!(ws.path().join("Main.java").exists());
    }

    proptest! {
        #[test]
        fn extracted_name_is_always_a_safe_file_stem(source in ".{0,200}") {
            let name = extract_public_class(&source);
            prop_assert!(is_java_identifier(&name));
            prop_assert!(!name.contains('/') && !name.contains('\\') && !name.contains('.'));
        }

        #[test]
        fn declared_identifier_is_recovered(name in "[A-Z][A-Za-z0-9_]{0,20}") {
            let source = format!("public class {name} {{ }}");
            prop_assert_eq!(extract_public_class(&source), name);
        }
    }
}
