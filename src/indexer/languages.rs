use std::fmt;

use tree_sitter::Language as Grammar;

/// Languages accepted by the file filter, with their normalized tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    C,
    Cpp,
    CSharp,
    Cobol,
    Elixir,
    Go,
    Java,
    JavaScript,
    Kotlin,
    Lua,
    Perl,
    Python,
    Ruby,
    Rust,
    Scala,
    TypeScript,
}

impl Language {
    #[cfg(test)]
    pub(crate) const ALL: [Language; 16] = [
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Cobol,
        Language::Elixir,
        Language::Go,
        Language::Java,
        Language::JavaScript,
        Language::Kotlin,
        Language::Lua,
        Language::Perl,
        Language::Python,
        Language::Ruby,
        Language::Rust,
        Language::Scala,
        Language::TypeScript,
    ];

    /// Map a file extension (without the dot) to a language.
    pub fn from_extension(ext: &str) -> Option<Language> {
        let lang = match ext {
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "cs" => Language::CSharp,
            "cbl" | "cob" => Language::Cobol,
            "ex" | "exs" => Language::Elixir,
            "go" => Language::Go,
            "java" => Language::Java,
            "js" => Language::JavaScript,
            "kt" => Language::Kotlin,
            "lua" => Language::Lua,
            "pl" => Language::Perl,
            "py" => Language::Python,
            "rb" => Language::Ruby,
            "rs" => Language::Rust,
            "scala" => Language::Scala,
            "ts" => Language::TypeScript,
            _ => return None,
        };
        Some(lang)
    }

    pub fn tag(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Cobol => "cobol",
            Language::Elixir => "elixir",
            Language::Go => "go",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::Kotlin => "kotlin",
            Language::Lua => "lua",
            Language::Perl => "perl",
            Language::Python => "python",
            Language::Ruby => "ruby",
            Language::Rust => "rust",
            Language::Scala => "scala",
            Language::TypeScript => "typescript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Tree-sitter grammar and definition query for a language with
/// structural chunking support.
pub struct LanguageConfig {
    pub language: Language,
    pub grammar: Grammar,
    /// Captures every definition node that is a preferred split point.
    /// `@name` captures are ignored by the chunker.
    pub query: &'static str,
}

impl LanguageConfig {
    pub fn get_all() -> Vec<LanguageConfig> {
        vec![
            go_config(),
            python_config(),
            typescript_config(),
            javascript_config(),
            rust_config(),
        ]
    }
}

fn go_config() -> LanguageConfig {
    LanguageConfig {
        language: Language::Go,
        grammar: tree_sitter_go::LANGUAGE.into(),
        query: r#"
(function_declaration
  name: (identifier) @name) @function

(method_declaration
  name: (field_identifier) @name) @method

(type_declaration
  (type_spec
    name: (type_identifier) @name
    type: (struct_type))) @struct

(type_declaration
  (type_spec
    name: (type_identifier) @name
    type: (interface_type))) @interface
"#,
    }
}

fn python_config() -> LanguageConfig {
    LanguageConfig {
        language: Language::Python,
        grammar: tree_sitter_python::LANGUAGE.into(),
        query: r#"
(decorated_definition) @function

(function_definition
  name: (identifier) @name) @function

(class_definition
  name: (identifier) @name) @class
"#,
    }
}

fn typescript_config() -> LanguageConfig {
    LanguageConfig {
        language: Language::TypeScript,
        grammar: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        query: r#"
(function_declaration
  name: (identifier) @name) @function

(lexical_declaration
  (variable_declarator
    name: (identifier) @name
    value: (arrow_function))) @function

(class_declaration
  name: (type_identifier) @name) @class

(interface_declaration
  name: (type_identifier) @name) @interface

(method_definition
  name: (property_identifier) @name) @method
"#,
    }
}

fn javascript_config() -> LanguageConfig {
    LanguageConfig {
        language: Language::JavaScript,
        grammar: tree_sitter_javascript::LANGUAGE.into(),
        query: r#"
(function_declaration
  name: (identifier) @name) @function

(lexical_declaration
  (variable_declarator
    name: (identifier) @name
    value: (arrow_function))) @function

(class_declaration
  name: (identifier) @name) @class

(method_definition
  name: (property_identifier) @name) @method
"#,
    }
}

fn rust_config() -> LanguageConfig {
    LanguageConfig {
        language: Language::Rust,
        grammar: tree_sitter_rust::LANGUAGE.into(),
        query: r#"
(function_item
  name: (identifier) @name) @function

(impl_item
  type: (type_identifier) @name) @struct

(struct_item
  name: (type_identifier) @name) @struct

(enum_item
  name: (type_identifier) @name) @struct

(trait_item
  name: (type_identifier) @name) @interface

(mod_item
  name: (identifier) @name) @function
"#,
    }
}
