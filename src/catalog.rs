//! Runtime catalogue: the read-only mapping from runtime key to compile/run
//! command templates, plus the language rows seeded at install.
//!
//! Adding a language is a data change here, not a code change elsewhere:
//! the runner dispatches through [`commands_for`] and nothing else.

use crate::models::RuntimeKey;

/// Name given to the compiled artifact inside the scratch directory.
pub const BINARY_NAME: &str = "main";

/// Command templates for one runtime. `{source}` expands to the source file
/// name, `{binary}` to [`BINARY_NAME`]; both are relative to the scratch
/// directory the process runs in.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeCommands {
    pub file_name: &'static str,
    pub compile: Option<&'static [&'static str]>,
    pub run: &'static [&'static str],
}

pub fn commands_for(runtime: RuntimeKey) -> Option<&'static RuntimeCommands> {
    let commands = match runtime {
        RuntimeKey::Python => &RuntimeCommands {
            file_name: "main.py",
            compile: None,
            run: &["python3", "{source}"],
        },
        RuntimeKey::Node => &RuntimeCommands {
            file_name: "main.js",
            compile: None,
            run: &["node", "{source}"],
        },
        RuntimeKey::Gcc => &RuntimeCommands {
            file_name: "main.c",
            compile: Some(&["gcc", "{source}", "-O2", "-o", "{binary}"]),
            run: &["./{binary}"],
        },
        RuntimeKey::Gpp => &RuntimeCommands {
            file_name: "main.cpp",
            compile: Some(&["g++", "{source}", "-O2", "-o", "{binary}"]),
            run: &["./{binary}"],
        },
        RuntimeKey::Java => &RuntimeCommands {
            file_name: "Main.java",
            compile: None,
            run: &["java", "{source}"],
        },
        RuntimeKey::Go => &RuntimeCommands {
            file_name: "main.go",
            compile: None,
            run: &["go", "run", "{source}"],
        },
        RuntimeKey::Php => &RuntimeCommands {
            file_name: "main.php",
            compile: None,
            run: &["php", "{source}"],
        },
        RuntimeKey::Ruby => &RuntimeCommands {
            file_name: "main.rb",
            compile: None,
            run: &["ruby", "{source}"],
        },
        RuntimeKey::Shell => &RuntimeCommands {
            file_name: "main.sh",
            compile: None,
            run: &["sh", "{source}"],
        },
    };
    Some(commands)
}

/// Expand a command template against concrete file names.
pub fn expand_command(template: &[&str], source: &str, binary: &str) -> Vec<String> {
    template
        .iter()
        .map(|part| part.replace("{source}", source).replace("{binary}", binary))
        .collect()
}

/// One language row seeded at startup.
pub struct SeedLanguage {
    pub id: &'static str,
    pub name: &'static str,
    pub runtime: RuntimeKey,
    pub version: &'static str,
    pub template_code: &'static str,
}

pub const SEED_LANGUAGES: &[SeedLanguage] = &[
    SeedLanguage {
        id: "python",
        name: "Python 3",
        runtime: RuntimeKey::Python,
        version: "3.11",
        template_code: "print(\"Hello World\")\n",
    },
    SeedLanguage {
        id: "node",
        name: "Node.js",
        runtime: RuntimeKey::Node,
        version: "20",
        template_code: "console.log(\"Hello World\");\n",
    },
    SeedLanguage {
        id: "c",
        name: "C (GCC)",
        runtime: RuntimeKey::Gcc,
        version: "13",
        template_code: "#include <stdio.h>\n\nint main(void) {\n    printf(\"Hello World\\n\");\n    return 0;\n}\n",
    },
    SeedLanguage {
        id: "cpp",
        name: "C++ (G++)",
        runtime: RuntimeKey::Gpp,
        version: "13",
        template_code: "#include <iostream>\n\nint main() {\n    std::cout << \"Hello World\" << std::endl;\n    return 0;\n}\n",
    },
    SeedLanguage {
        id: "java",
        name: "Java",
        runtime: RuntimeKey::Java,
        version: "21",
        template_code: "public class Main {\n    public static void main(String[] args) {\n        System.out.println(\"Hello World\");\n    }\n}\n",
    },
    SeedLanguage {
        id: "go",
        name: "Go",
        runtime: RuntimeKey::Go,
        version: "1.22",
        template_code: "package main\n\nimport \"fmt\"\n\nfunc main() {\n    fmt.Println(\"Hello World\")\n}\n",
    },
    SeedLanguage {
        id: "php",
        name: "PHP",
        runtime: RuntimeKey::Php,
        version: "8.3",
        template_code: "<?php\necho \"Hello World\\n\";\n",
    },
    SeedLanguage {
        id: "ruby",
        name: "Ruby",
        runtime: RuntimeKey::Ruby,
        version: "3.3",
        template_code: "puts \"Hello World\"\n",
    },
    SeedLanguage {
        id: "shell",
        name: "Shell",
        runtime: RuntimeKey::Shell,
        version: "POSIX sh",
        template_code: "echo \"Hello World\"\n",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_seeded_runtime_has_commands() {
        for seed in SEED_LANGUAGES {
            let commands = commands_for(seed.runtime).expect("missing catalogue entry");
            assert!(!commands.run.is_empty());
            assert!(!commands.file_name.is_empty());
        }
    }

    #[test]
    fn only_c_family_compiles() {
        for seed in SEED_LANGUAGES {
            let commands = commands_for(seed.runtime).unwrap();
            let expect_compile =
                matches!(seed.runtime, RuntimeKey::Gcc | RuntimeKey::Gpp);
            assert_eq!(commands.compile.is_some(), expect_compile, "{}", seed.id);
        }
    }

    #[test]
    fn command_expansion_substitutes_both_tokens() {
        let argv = expand_command(&["gcc", "{source}", "-o", "{binary}"], "main.c", "main");
        assert_eq!(argv, vec!["gcc", "main.c", "-o", "main"]);

        let argv = expand_command(&["./{binary}"], "main.c", "main");
        assert_eq!(argv, vec!["./main"]);
    }

    #[test]
    fn seed_ids_are_unique() {
        let mut ids: Vec<_> = SEED_LANGUAGES.iter().map(|s| s.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), SEED_LANGUAGES.len());
    }
}
