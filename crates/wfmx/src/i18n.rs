//! 🌍 Text lookup. Every human-readable string the engine produces goes through here.
//!
//! The engine speaks in keys and positional args. Whoever embeds it can plug in a
//! real bundle; out of the box you get `DefaultI18n`, English, no regional accents.
//! Unknown keys come back as the key itself, so a missing translation is ugly
//! but never fatal.

pub const SUBTASK_VERIFICATION: &str = "migration.subtask.verification";
pub const SUBTASK_MIGRATION: &str = "migration.subtask.migration";
pub const SUBTASK_ASSOCIATION: &str = "migration.subtask.association";
pub const PROGRESS_FIND_AFFECTED: &str = "migration.progress.find.affected.issues";
pub const PROGRESS_FOUND_AFFECTED: &str = "migration.progress.found.affected.issues";
pub const PROGRESS_VERIFY_ISSUE: &str = "migration.progress.verify.issue";
pub const PROGRESS_MIGRATE_ISSUE: &str = "migration.progress.migrate.issue";
pub const PROGRESS_ASSIGN_WORKFLOW: &str = "migration.progress.assign.workflow";
pub const PROGRESS_COMPLETE_IN_PROJECT: &str = "migration.progress.complete.in.project";
pub const PROGRESS_QUICK_MIGRATE: &str = "migration.progress.quick.migrate";
pub const PROGRESS_MIGRATE_PROJECT: &str = "migration.progress.migrate.project";
pub const PROGRESS_COMPLETE: &str = "migration.progress.complete";
pub const ERROR_NO_MAPPING: &str = "migration.error.no.mapping";
pub const ERROR_TARGET_NOT_IN_WORKFLOW: &str = "migration.error.target.status.not.in.workflow";
pub const ERROR_STATUS_NOT_IN_CURRENT_WORKFLOW: &str =
    "migration.error.status.not.in.current.workflow";
pub const ERROR_MISSING_WORKFLOW_ENTRY: &str = "migration.error.missing.workflow.entry";
pub const DRAFT_AUTO_GENERATED: &str = "migration.draft.auto.generated";
pub const WORD_DEFAULT: &str = "common.words.default";

/// 📖 The built-in English bundle. `{0}`, `{1}`, ... are positional args.
const ENGLISH: &[(&str, &str)] = &[
    (SUBTASK_VERIFICATION, "Verification"),
    (SUBTASK_MIGRATION, "Migration"),
    (SUBTASK_ASSOCIATION, "Association"),
    (PROGRESS_FIND_AFFECTED, "Finding affected issues in project '{0}'."),
    (PROGRESS_FOUND_AFFECTED, "Found affected issues in project '{0}'."),
    (PROGRESS_VERIFY_ISSUE, "Verifying issue {0} of {1} in project '{2}'."),
    (PROGRESS_MIGRATE_ISSUE, "Migrating issue {0} of {1} in project '{2}'."),
    (
        PROGRESS_ASSIGN_WORKFLOW,
        "Assigning workflow scheme '{0}' to project '{1}'.",
    ),
    (
        PROGRESS_COMPLETE_IN_PROJECT,
        "Workflow migration complete in project '{0}'.",
    ),
    (
        PROGRESS_QUICK_MIGRATE,
        "No issues need migrating, associating workflow scheme '{0}' directly.",
    ),
    (PROGRESS_MIGRATE_PROJECT, "Migrating project {0} of {1}: '{2}'."),
    (PROGRESS_COMPLETE, "Workflow migration complete."),
    (
        ERROR_NO_MAPPING,
        "Issue {0} has status '{1}' of issue type '{2}' with no status mapping.",
    ),
    (
        ERROR_TARGET_NOT_IN_WORKFLOW,
        "Issue {0} would move to status '{1}' which workflow '{2}' does not contain.",
    ),
    (
        ERROR_STATUS_NOT_IN_CURRENT_WORKFLOW,
        "Issue {0} has status '{1}' which its current workflow '{2}' does not contain.",
    ),
    (
        ERROR_MISSING_WORKFLOW_ENTRY,
        "Issue {0} has no workflow entry.",
    ),
    (
        DRAFT_AUTO_GENERATED,
        "(This copy was automatically generated from a draft, when workflow scheme '{0}' was made inactive.)",
    ),
    (WORD_DEFAULT, "Default"),
];

pub trait I18n: Send + Sync + std::fmt::Debug {
    fn text(&self, key: &str, args: &[&str]) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultI18n;

impl I18n for DefaultI18n {
    fn text(&self, key: &str, args: &[&str]) -> String {
        let template = ENGLISH
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, template)| *template)
            .unwrap_or(key);
        render(template, args)
    }
}

/// 🖨️ Substitute `{n}` with `args[n]`. Placeholders without an arg are left alone.
pub fn render(template: &str, args: &[&str]) -> String {
    let mut rendered = template.to_string();
    for (index, arg) in args.iter().enumerate() {
        rendered = rendered.replace(&format!("{{{index}}}"), arg);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_args_land_in_their_seats() {
        let text = DefaultI18n.text(PROGRESS_VERIFY_ISSUE, &["3", "10", "Apollo"]);
        assert_eq!(text, "Verifying issue 3 of 10 in project 'Apollo'.");
    }

    #[test]
    fn the_one_where_unknown_keys_echo_back() {
        assert_eq!(DefaultI18n.text("no.such.key", &["x"]), "no.such.key");
        assert_eq!(render("{0} and {1}", &["a"]), "a and {1}");
    }
}
