//! Per-sheet seeders
//!
//! Every seeder applies the same row contract: rows with all fields empty
//! are skipped, rows missing a required field append an error line and the
//! sheet continues, everything else is an upsert on the sheet's natural
//! key. A row never aborts its sheet; the one exception is the sub-task
//! reference id, which aborts the whole run.

use polaris_common::{Error, Result};
use uuid::Uuid;

use super::archive::{Record, SeedArchive};
use super::naming::CertNaming;
use crate::db::content::{certifications, controls, library, people, programs};
use crate::db::content::controls::{ActionItemUpsert, ControlUpsert};
use crate::db::content::library::ChecklistResource;
use crate::db::content::programs::SubtaskUpsert;
use crate::db::users;
use crate::state::AppState;

/// Fixed processing order; dependencies before dependents
pub const SHEET_ORDER: &[&str] = &[
    "certification_sections",
    "organization_certifications",
    "control_groups",
    "controls",
    "control_certification_sections",
    "control_action_items",
    "programs",
    "tasks",
    "howtoguide",
    "sub-tasks",
    "trainings",
    "officers",
    "users",
    "teams",
    "team_members",
    "policies",
    "vendors",
    "library",
    "certification_logos",
    "object_types",
    "object_type_attributes",
    "documents",
    "templates",
    "checklist",
];

/// Pull a required field or record the row error
fn require<'r>(
    record: &'r Record,
    entity: &str,
    field: &str,
    errors: &mut Vec<String>,
) -> Option<&'r str> {
    match record.get(field) {
        Some(value) => Some(value),
        None => {
            errors.push(format!(
                "Error seeding {entity} row {}: missing required field '{field}'",
                record.row()
            ));
            None
        }
    }
}

/// Dispatch one sheet's records to its seeder
pub async fn process_sheet(
    state: &AppState,
    tenant_id: Uuid,
    archive: &SeedArchive,
    sheet: &str,
    records: &[Record],
    naming: &CertNaming,
    errors: &mut Vec<String>,
) -> Result<()> {
    match sheet {
        "certification_sections" => seed_certification_sections(state, tenant_id, records, naming, errors).await,
        "organization_certifications" => seed_org_certifications(state, tenant_id, records, naming, errors).await,
        "control_groups" => seed_control_groups(state, tenant_id, records, errors).await,
        "controls" => seed_controls(state, tenant_id, records, errors).await,
        "control_certification_sections" => seed_control_cert_sections(state, tenant_id, records, naming, errors).await,
        "control_action_items" => seed_action_items(state, tenant_id, records, errors).await,
        "programs" => seed_programs(state, tenant_id, records, errors).await,
        "tasks" => seed_tasks(state, tenant_id, records, errors).await,
        "howtoguide" => seed_howtoguides(state, tenant_id, records, errors).await,
        "sub-tasks" => seed_subtasks(state, tenant_id, records, errors).await,
        "trainings" => seed_trainings(state, tenant_id, records, errors).await,
        "officers" => seed_officers(state, tenant_id, records, errors).await,
        "users" => seed_users(state, tenant_id, records, errors).await,
        "teams" => seed_teams(state, tenant_id, records, errors).await,
        "team_members" => seed_team_members(state, tenant_id, records, errors).await,
        "policies" => seed_policies(state, tenant_id, archive, records, errors).await,
        "vendors" => seed_vendors(state, tenant_id, archive, records, errors).await,
        "library" => seed_library(state, tenant_id, records, errors).await,
        "certification_logos" => seed_certification_logos(state, records, naming, errors).await,
        "object_types" => seed_object_types(state, tenant_id, records, errors).await,
        "object_type_attributes" => seed_object_type_attributes(state, tenant_id, records, errors).await,
        "documents" => seed_documents(state, tenant_id, records, errors).await,
        "templates" => seed_templates(state, tenant_id, archive, records, errors).await,
        "checklist" => seed_checklists(state, tenant_id, records, errors).await,
        other => {
            tracing::debug!(sheet = %other, "Skipping unknown sheet");
            Ok(())
        }
    }
}

async fn seed_certification_sections(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    naming: &CertNaming,
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(certification) = require(record, "certification section", "certification", errors)
        else {
            continue;
        };
        let Some(section) = require(record, "certification section", "section", errors) else {
            continue;
        };
        let certification = naming.canonical(certification);
        if let Err(e) =
            certifications::upsert_section(&state.db, tenant_id, &certification, section).await
        {
            errors.push(format!(
                "Error seeding certification section row {}: {e}",
                record.row()
            ));
        }
    }
    Ok(())
}

async fn seed_org_certifications(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    naming: &CertNaming,
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "organization certification", "name", errors) else {
            continue;
        };
        let name = naming.canonical(name);
        if let Err(e) =
            certifications::upsert_org_certification(&state.db, tenant_id, &name).await
        {
            errors.push(format!(
                "Error seeding organization certification row {}: {e}",
                record.row()
            ));
        }
    }
    Ok(())
}

async fn seed_control_groups(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "control group", "name", errors) else {
            continue;
        };
        if let Err(e) = controls::upsert_group(&state.db, tenant_id, name).await {
            errors.push(format!("Error seeding control group row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_controls(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "control", "name", errors) else {
            continue;
        };
        let upsert = ControlUpsert {
            reference_id: record.get("reference_id").map(String::from),
            name: name.to_string(),
            description: record.get("description").unwrap_or_default().to_string(),
            group_name: record.get("group").map(String::from),
            framework_tag: record.get("framework").map(String::from),
            ..Default::default()
        };
        if let Err(e) = controls::upsert_control(&state.db, tenant_id, &upsert).await {
            errors.push(format!("Error seeding control row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_control_cert_sections(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    naming: &CertNaming,
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(reference) = require(record, "control certification section", "control_reference_id", errors)
        else {
            continue;
        };
        let Some(certification) = require(record, "control certification section", "certification", errors)
        else {
            continue;
        };
        let Some(section) = require(record, "control certification section", "section", errors)
        else {
            continue;
        };
        let certification = naming.canonical(certification);
        if let Err(e) = controls::upsert_cert_section_link(
            &state.db,
            tenant_id,
            reference,
            &certification,
            section,
        )
        .await
        {
            errors.push(format!(
                "Error seeding control certification section row {}: {e}",
                record.row()
            ));
        }
    }
    Ok(())
}

async fn seed_action_items(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(reference) = require(record, "action item", "reference_id", errors) else {
            continue;
        };
        let Some(name) = require(record, "action item", "name", errors) else {
            continue;
        };
        let upsert = ActionItemUpsert {
            reference_id: reference.to_string(),
            name: name.to_string(),
            description: record.get("description").unwrap_or_default().to_string(),
            recurring_schedule: record.get("recurring_schedule").map(String::from),
            required_evidence: record.get("required_evidence").map(String::from),
            control_reference: record.get("control_reference_id").map(String::from),
        };
        if let Err(e) = controls::upsert_action_item(&state.db, tenant_id, &upsert).await {
            errors.push(format!("Error seeding action item row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_programs(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "program", "name", errors) else {
            continue;
        };
        if let Err(e) = programs::upsert_program(&state.db, tenant_id, name).await {
            errors.push(format!("Error seeding program row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_tasks(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(program) = require(record, "task", "program_name", errors) else {
            continue;
        };
        let Some(name) = require(record, "task", "name", errors) else {
            continue;
        };
        if let Err(e) = programs::upsert_task(&state.db, tenant_id, program, name).await {
            errors.push(format!("Error seeding task row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_howtoguides(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(task) = require(record, "howtoguide", "task_name", errors) else {
            continue;
        };
        let Some(title) = require(record, "howtoguide", "title", errors) else {
            continue;
        };
        let body = record.get("body").unwrap_or_default();
        if let Err(e) = programs::upsert_howtoguide(&state.db, tenant_id, task, title, body).await {
            errors.push(format!("Error seeding howtoguide row {}: {e}", record.row()));
        }
    }
    Ok(())
}

/// Sub-tasks are the one sheet with a run-fatal precondition: every row
/// must carry its reference id or the whole seed fails.
async fn seed_subtasks(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        if record.get("subtask_reference_id").is_none() {
            return Err(Error::Validation(
                "subtask_reference_id is required".to_string(),
            ));
        }
    }

    for record in records {
        let reference = record
            .get("subtask_reference_id")
            .expect("checked above");
        let Some(program) = require(record, "subtask", "program_name", errors) else {
            continue;
        };
        let Some(task) = require(record, "subtask", "task_name", errors) else {
            continue;
        };
        let Some(name) = require(record, "subtask", "name", errors) else {
            continue;
        };
        let upsert = SubtaskUpsert {
            reference_id: reference.to_string(),
            program_name: program.to_string(),
            task_name: task.to_string(),
            name: name.to_string(),
            migration_id: record.get("migration_id").map(String::from),
        };
        if let Err(e) = programs::upsert_subtask(&state.db, tenant_id, &upsert).await {
            errors.push(format!("Error seeding subtask row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_trainings(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "training", "name", errors) else {
            continue;
        };
        if let Err(e) = people::upsert_training(&state.db, tenant_id, name).await {
            errors.push(format!("Error seeding training row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_officers(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "officer", "name", errors) else {
            continue;
        };
        if let Err(e) =
            people::upsert_officer(&state.db, tenant_id, name, record.get("user_email")).await
        {
            errors.push(format!("Error seeding officer row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_users(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(email) = require(record, "user", "email", errors) else {
            continue;
        };
        if let Err(e) = users::get_or_create_partial(&state.db, email, tenant_id).await {
            errors.push(format!("Error seeding user row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_teams(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "team", "name", errors) else {
            continue;
        };
        if let Err(e) = people::upsert_team(&state.db, tenant_id, name).await {
            errors.push(format!("Error seeding team row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_team_members(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(team) = require(record, "team member", "team_name", errors) else {
            continue;
        };
        let Some(email) = require(record, "team member", "user_email", errors) else {
            continue;
        };
        if let Err(e) = people::upsert_team_member(&state.db, tenant_id, team, email).await {
            errors.push(format!("Error seeding team member row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_policies(
    state: &AppState,
    tenant_id: Uuid,
    archive: &SeedArchive,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "policy", "name", errors) else {
            continue;
        };

        // Document bodies ride along in the archive under policies/
        let attachment = format!("policies/{name}.docx");
        let stored = match archive.file(&attachment) {
            Some(bytes) => match state.drive.put_file(tenant_id, &attachment, bytes) {
                Ok(_) => Some(attachment.clone()),
                Err(e) => {
                    errors.push(format!("Error seeding policy row {}: {e}", record.row()));
                    continue;
                }
            },
            None => None,
        };

        if let Err(e) =
            library::upsert_policy(&state.db, tenant_id, name, stored.as_deref()).await
        {
            errors.push(format!("Error seeding policy row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_vendors(
    state: &AppState,
    tenant_id: Uuid,
    archive: &SeedArchive,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "vendor", "name", errors) else {
            continue;
        };

        let logo = record.get("logo").map(String::from);
        if let Some(logo) = &logo {
            let attachment = format!("vendors/{logo}");
            if let Some(bytes) = archive.file(&attachment) {
                if let Err(e) = state.drive.put_file(tenant_id, &attachment, bytes) {
                    errors.push(format!("Error seeding vendor row {}: {e}", record.row()));
                    continue;
                }
            }
        }

        if let Err(e) = library::upsert_vendor(&state.db, name, logo.as_deref()).await {
            errors.push(format!("Error seeding vendor row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_library(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(question) = require(record, "library question", "question", errors) else {
            continue;
        };
        let answer = record.get("answer").unwrap_or_default();
        if let Err(e) =
            library::upsert_library_question(&state.db, tenant_id, question, answer).await
        {
            errors.push(format!(
                "Error seeding library question row {}: {e}",
                record.row()
            ));
        }
    }
    Ok(())
}

async fn seed_certification_logos(
    state: &AppState,
    records: &[Record],
    naming: &CertNaming,
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(certification) = require(record, "certification logo", "certification", errors)
        else {
            continue;
        };
        let Some(logo) = require(record, "certification logo", "logo_file", errors) else {
            continue;
        };
        let certification = naming.canonical(certification);
        if let Err(e) = certifications::upsert_logo(&state.db, &certification, logo).await {
            errors.push(format!(
                "Error seeding certification logo row {}: {e}",
                record.row()
            ));
        }
    }
    Ok(())
}

async fn seed_object_types(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "object type", "name", errors) else {
            continue;
        };
        let display_index = record
            .get("display_index")
            .and_then(|v| v.parse::<f64>().ok())
            .map(|v| v as i64)
            .unwrap_or(0);
        if let Err(e) =
            library::upsert_object_type(&state.db, tenant_id, name, display_index).await
        {
            errors.push(format!("Error seeding object type row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_object_type_attributes(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(object_type) = require(record, "object type attribute", "object_type", errors)
        else {
            continue;
        };
        let Some(name) = require(record, "object type attribute", "name", errors) else {
            continue;
        };
        let attr_type = record.get("type").unwrap_or("text");
        if let Err(e) = library::upsert_object_type_attribute(
            &state.db,
            tenant_id,
            object_type,
            name,
            attr_type,
        )
        .await
        {
            errors.push(format!(
                "Error seeding object type attribute row {}: {e}",
                record.row()
            ));
        }
    }
    Ok(())
}

async fn seed_documents(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "document", "name", errors) else {
            continue;
        };
        if let Err(e) =
            library::upsert_document(&state.db, tenant_id, name, record.get("file")).await
        {
            errors.push(format!("Error seeding document row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_templates(
    state: &AppState,
    tenant_id: Uuid,
    archive: &SeedArchive,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(name) = require(record, "template", "name", errors) else {
            continue;
        };

        let attachment = format!("templates/{name}.html");
        let stored = match archive.file(&attachment) {
            Some(bytes) => match state.drive.put_file(tenant_id, &attachment, bytes) {
                Ok(_) => Some(attachment.clone()),
                Err(e) => {
                    errors.push(format!("Error seeding template row {}: {e}", record.row()));
                    continue;
                }
            },
            None => None,
        };

        if let Err(e) =
            library::upsert_template(&state.db, tenant_id, name, stored.as_deref(), false).await
        {
            errors.push(format!("Error seeding template row {}: {e}", record.row()));
        }
    }
    Ok(())
}

async fn seed_checklists(
    state: &AppState,
    tenant_id: Uuid,
    records: &[Record],
    errors: &mut Vec<String>,
) -> Result<()> {
    for record in records {
        let Some(checklist) = require(record, "checklist item", "checklist", errors) else {
            continue;
        };
        let Some(kind) = require(record, "checklist item", "resource_type", errors) else {
            continue;
        };
        let Some(resource_id) = require(record, "checklist item", "resource_id", errors) else {
            continue;
        };

        let resource = match kind {
            "vendor" => ChecklistResource::Vendor(resource_id.to_string()),
            "step" => ChecklistResource::Step(resource_id.to_string()),
            other => {
                errors.push(format!(
                    "Error seeding checklist item row {}: unknown resource type '{other}'",
                    record.row()
                ));
                continue;
            }
        };

        let description = record.get("description").unwrap_or_default();
        if let Err(e) = library::upsert_checklist(&state.db, tenant_id, checklist).await {
            errors.push(format!("Error seeding checklist item row {}: {e}", record.row()));
            continue;
        }
        if let Err(e) = library::upsert_checklist_item(
            &state.db,
            tenant_id,
            checklist,
            &resource,
            description,
        )
        .await
        {
            errors.push(format!("Error seeding checklist item row {}: {e}", record.row()));
        }
    }
    Ok(())
}
