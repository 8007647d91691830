use crate::db::SqliteSource;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, parse_filters, ready_snapshot, required_str};
use crate::ipc::types::{AppState, LoadState, Request};
use crate::rollup::Rollup;
use crate::settings;
use crate::snapshot::Snapshot;
use crate::table::build_row_table;
use crate::view::grade_levels;
use serde_json::json;

fn handle_scores_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // The previous snapshot is dropped up front; a failed load leaves nothing to show.
    state.scores = LoadState::Loading;
    match Snapshot::load(&SqliteSource { conn }) {
        Ok(snapshot) => {
            let result = json!({
                "loadId": snapshot.load_id(),
                "loadedAt": snapshot.loaded_at(),
                "students": snapshot.students().len(),
                "lessons": snapshot.lessons().len(),
                "attempts": snapshot.index().len(),
                "duplicateAttempts": snapshot.index().overwritten(),
            });
            state.scores = LoadState::Ready(snapshot);
            ok(&req.id, result)
        }
        Err(e) => {
            log::error!("score load failed: {}", e);
            err(
                &req.id,
                "load_failed",
                e.to_string(),
                Some(json!({ "recordSet": e.set.to_string() })),
            )
        }
    }
}

fn handle_scores_grade_levels(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snapshot = match ready_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "gradeLevels": grade_levels(snapshot.students()) }),
    )
}

fn handle_scores_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snapshot = match ready_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filters = match parse_filters(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let display = match settings::display_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let table = build_row_table(snapshot, &filters, &display);
    ok(
        &req.id,
        json!({
            "loadId": snapshot.load_id(),
            "filters": filters,
            "totalStudents": snapshot.students().len(),
            "matchedStudents": table.rows.len(),
            "digest": table.digest(),
            "columns": table.columns,
            "rows": table.rows,
        }),
    )
}

fn handle_scores_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snapshot = match ready_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(student) = snapshot.student(&student_id) else {
        return err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        );
    };

    let rollup = Rollup::new(snapshot).student_rollup(&student.id);
    ok(
        &req.id,
        json!({
            "student": student,
            "avatar": student.avatar(),
            "rollup": rollup,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.load" => Some(handle_scores_load(state, req)),
        "scores.gradeLevels" => Some(handle_scores_grade_levels(state, req)),
        "scores.view" => Some(handle_scores_view(state, req)),
        "scores.student" => Some(handle_scores_student(state, req)),
        _ => None,
    }
}
