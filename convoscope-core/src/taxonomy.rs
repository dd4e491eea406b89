//! Tool taxonomy
//!
//! Maps raw tool names, which vary per agent, onto a small fixed category
//! vocabulary. The table is static: downstream consumers rely on category
//! assignments not drifting between runs.

use serde::{Deserialize, Serialize};

/// Category of a tool call, computed from the tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolCategory {
    Read,
    Edit,
    Write,
    Bash,
    Grep,
    Glob,
    Task,
    /// A recognized tool that fits no filesystem/shell category
    Tool,
    /// Unrecognized tool name
    Other,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Read => "read",
            ToolCategory::Edit => "edit",
            ToolCategory::Write => "write",
            ToolCategory::Bash => "bash",
            ToolCategory::Grep => "grep",
            ToolCategory::Glob => "glob",
            ToolCategory::Task => "task",
            ToolCategory::Tool => "tool",
            ToolCategory::Other => "other",
        }
    }
}

impl std::str::FromStr for ToolCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(ToolCategory::Read),
            "edit" => Ok(ToolCategory::Edit),
            "write" => Ok(ToolCategory::Write),
            "bash" => Ok(ToolCategory::Bash),
            "grep" => Ok(ToolCategory::Grep),
            "glob" => Ok(ToolCategory::Glob),
            "task" => Ok(ToolCategory::Task),
            "tool" => Ok(ToolCategory::Tool),
            "other" => Ok(ToolCategory::Other),
            _ => Err(format!("unknown tool category: {}", s)),
        }
    }
}

/// Classify a raw tool name.
///
/// Names are matched exactly first, then by well-known lowercase aliases
/// used by the non-reference agents.
pub fn categorize_tool(name: &str) -> ToolCategory {
    match name {
        "Read" | "ReadFile" | "NotebookRead" => ToolCategory::Read,
        "Edit" | "MultiEdit" | "NotebookEdit" => ToolCategory::Edit,
        "Write" | "WriteFile" => ToolCategory::Write,
        "Bash" | "BashOutput" | "KillShell" => ToolCategory::Bash,
        "Grep" => ToolCategory::Grep,
        "Glob" | "LS" => ToolCategory::Glob,
        "Task" | "Agent" => ToolCategory::Task,
        "WebFetch" | "WebSearch" | "TodoWrite" | "TodoRead" | "Skill" | "ExitPlanMode"
        | "AskUserQuestion" => ToolCategory::Tool,
        _ => match name.to_ascii_lowercase().as_str() {
            "read" | "read_file" | "view" | "cat" => ToolCategory::Read,
            "edit" | "edit_file" | "str_replace" | "str_replace_editor" | "apply_patch"
            | "patch" => ToolCategory::Edit,
            "write" | "write_file" | "create_file" | "create" => ToolCategory::Write,
            "bash" | "shell" | "exec" | "exec_command" | "run_terminal_cmd" | "terminal"
            | "local_shell" => ToolCategory::Bash,
            "grep" | "search" | "grep_search" | "search_file_content" | "codebase_search" => {
                ToolCategory::Grep
            }
            "glob" | "list" | "list_dir" | "list_directory" | "file_search" | "find_files" => {
                ToolCategory::Glob
            }
            "task" | "agent" | "subagent" | "spawn_agent" => ToolCategory::Task,
            "web_fetch" | "web_search" | "fetch" | "browser" | "todowrite" | "todoread"
            | "update_plan" | "memory" => ToolCategory::Tool,
            _ => ToolCategory::Other,
        },
    }
}
