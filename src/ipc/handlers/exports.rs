use crate::export::{self, ExportError};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, parse_filters, ready_snapshot};
use crate::ipc::types::{AppState, Request};
use crate::settings;
use crate::table::build_row_table;
use serde_json::json;

fn export_err(req: &Request, e: ExportError) -> serde_json::Value {
    log::warn!("export failed: {}", e);
    err(&req.id, "export_failed", e.to_string(), None)
}

fn handle_exports_spreadsheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(workspace) = state.workspace.as_deref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let snapshot = match ready_snapshot(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filters = match parse_filters(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_path = match optional_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let display = match settings::display_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let exports = match settings::export_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let path = match export::resolve_output_path(
        workspace,
        out_path,
        &exports.spreadsheet_file_name,
    ) {
        Ok(p) => p,
        Err(e) => return export_err(req, e),
    };

    let table = build_row_table(snapshot, &filters, &display);
    match export::write_spreadsheet(&table, &exports.sheet_name, &path) {
        Ok(row_count) => {
            log::info!(
                "spreadsheet written: {} ({} rows)",
                path.to_string_lossy(),
                row_count
            );
            ok(
                &req.id,
                json!({
                    "path": path.to_string_lossy(),
                    "rowCount": row_count,
                    "digest": table.digest(),
                }),
            )
        }
        Err(e) => export_err(req, e),
    }
}

fn handle_reports_score_report_model(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let exports = match settings::export_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let table = build_row_table(snapshot, &filters, &display);
    ok(&req.id, json!(export::report_model(&table, &exports)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exports.spreadsheet" => Some(handle_exports_spreadsheet(state, req)),
        "reports.scoreReportModel" => Some(handle_reports_score_report_model(state, req)),
        _ => None,
    }
}
