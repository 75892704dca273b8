//! Permission-mode policy: maps (mode, tool) to an immediate decision or an
//! instruction to ask the human.

use cw_backend::PermissionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    /// Inspection only: reading files, searching, fetching pages.
    ReadOnly,
    /// Mutates files through the editing surface.
    Edit,
    /// Executes commands or otherwise mutates state outside the editor.
    Execute,
}

impl ToolClass {
    pub fn is_destructive(self) -> bool {
        !matches!(self, ToolClass::ReadOnly)
    }
}

/// Fixed classification table. Tools not listed here classify as Execute so
/// an unrecognized capability always gets the most restrictive treatment the
/// current mode allows.
const TOOL_CLASSES: &[(&str, ToolClass)] = &[
    ("Read", ToolClass::ReadOnly),
    ("Glob", ToolClass::ReadOnly),
    ("Grep", ToolClass::ReadOnly),
    ("NotebookRead", ToolClass::ReadOnly),
    ("WebFetch", ToolClass::ReadOnly),
    ("WebSearch", ToolClass::ReadOnly),
    ("TodoRead", ToolClass::ReadOnly),
    ("Edit", ToolClass::Edit),
    ("MultiEdit", ToolClass::Edit),
    ("Write", ToolClass::Edit),
    ("NotebookEdit", ToolClass::Edit),
    ("Bash", ToolClass::Execute),
    ("Task", ToolClass::Execute),
];

pub fn classify(tool_name: &str) -> ToolClass {
    TOOL_CLASSES
        .iter()
        .find(|(name, _)| *name == tool_name)
        .map(|(_, class)| *class)
        .unwrap_or(ToolClass::Execute)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Ask,
    Deny,
}

/// Pure decision function. `Ask` means: raise a permission request and await
/// the human's boolean; `Allow`/`Deny` resolve synchronously.
pub fn decide(mode: PermissionMode, tool_name: &str) -> PolicyDecision {
    let class = classify(tool_name);
    match mode {
        PermissionMode::BypassPermissions => PolicyDecision::Allow,
        PermissionMode::Plan | PermissionMode::DontAsk => {
            if class.is_destructive() {
                PolicyDecision::Deny
            } else {
                PolicyDecision::Allow
            }
        }
        PermissionMode::AcceptEdits => match class {
            ToolClass::ReadOnly | ToolClass::Edit => PolicyDecision::Allow,
            ToolClass::Execute => PolicyDecision::Ask,
        },
        PermissionMode::Default => {
            if class.is_destructive() {
                PolicyDecision::Ask
            } else {
                PolicyDecision::Allow
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PolicyDecision::{Allow, Ask, Deny};

    #[test]
    fn classification_table_covers_the_tool_surface() {
        assert_eq!(classify("Read"), ToolClass::ReadOnly);
        assert_eq!(classify("Edit"), ToolClass::Edit);
        assert_eq!(classify("Bash"), ToolClass::Execute);
        // Unknown tools are treated as the most dangerous class.
        assert_eq!(classify("SomeNewTool"), ToolClass::Execute);
        assert!(!ToolClass::ReadOnly.is_destructive());
        assert!(ToolClass::Edit.is_destructive());
        assert!(ToolClass::Execute.is_destructive());
    }

    #[test]
    fn decision_table_matches_for_every_mode_and_tool_class() {
        // (mode, read-only, edit-class, execute-class)
        let expectations = [
            (PermissionMode::BypassPermissions, Allow, Allow, Allow),
            (PermissionMode::Plan, Allow, Deny, Deny),
            (PermissionMode::AcceptEdits, Allow, Allow, Ask),
            (PermissionMode::DontAsk, Allow, Deny, Deny),
            (PermissionMode::Default, Allow, Ask, Ask),
        ];
        for (mode, read_only, edit, execute) in expectations {
            assert_eq!(decide(mode, "Read"), read_only, "read-only under {mode}");
            assert_eq!(decide(mode, "Grep"), read_only, "read-only under {mode}");
            assert_eq!(decide(mode, "Edit"), edit, "edit under {mode}");
            assert_eq!(decide(mode, "Write"), edit, "edit under {mode}");
            assert_eq!(decide(mode, "Bash"), execute, "execute under {mode}");
            assert_eq!(decide(mode, "Task"), execute, "execute under {mode}");
        }
    }

    #[test]
    fn unknown_tools_follow_the_execute_column() {
        assert_eq!(decide(PermissionMode::Default, "Mystery"), Ask);
        assert_eq!(decide(PermissionMode::Plan, "Mystery"), Deny);
        assert_eq!(decide(PermissionMode::AcceptEdits, "Mystery"), Ask);
        assert_eq!(decide(PermissionMode::BypassPermissions, "Mystery"), Allow);
        assert_eq!(decide(PermissionMode::DontAsk, "Mystery"), Deny);
    }
}
