//! Local routes: health, readiness, status API, debug diagnostics, and the
//! per-body info pages.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use lightlag_catalog::{BodyClass, CelestialObject};

use crate::{HttpContext, text_response};

pub(crate) fn health() -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "lightlag",
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

/// Readiness: the distance table must be computable.
pub(crate) fn ready(ctx: &HttpContext) -> Response {
    match ctx.admission.ephemeris().snapshot(Utc::now()) {
        Ok(snapshot) => Json(serde_json::json!({
            "status": "ready",
            "bodies": snapshot.entries.len(),
            "computed_at": snapshot.computed_at.to_rfc3339(),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not ready",
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
struct StatusBody {
    name: String,
    #[serde(rename = "type")]
    class: BodyClass,
    #[serde(rename = "parentName", skip_serializing_if = "Option::is_none")]
    parent_name: Option<String>,
    distance_km: f64,
    latency_seconds: f64,
    occluded: bool,
    #[serde(rename = "occludedBy", skip_serializing_if = "Option::is_none")]
    occluded_by: Option<String>,
}

#[derive(Serialize)]
struct StatusData {
    timestamp: DateTime<Utc>,
    objects: BTreeMap<&'static str, Vec<StatusBody>>,
}

/// `/api/status-data`: the full distance table grouped by body class.
pub(crate) fn status_data(ctx: &HttpContext) -> Response {
    let snapshot = match ctx.admission.ephemeris().snapshot(Utc::now()) {
        Ok(snapshot) => snapshot,
        Err(e) => return text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut objects: BTreeMap<&'static str, Vec<StatusBody>> = BTreeMap::new();
    for entry in &snapshot.entries {
        objects
            .entry(entry.class.plural())
            .or_default()
            .push(StatusBody {
                name: entry.name.clone(),
                class: entry.class,
                parent_name: entry.parent.clone(),
                distance_km: entry.distance_km,
                latency_seconds: entry.latency_seconds,
                occluded: entry.occluded,
                occluded_by: entry.occluded_by.clone(),
            });
    }

    Json(StatusData {
        timestamp: snapshot.computed_at,
        objects,
    })
    .into_response()
}

pub(crate) fn debug_help(ctx: &HttpContext) -> Response {
    let suffix = &ctx.suffix;
    let text = format!(
        "lightlag diagnostics\n\
         ====================\n\n\
         Hostname grammar (labels right-to-left):\n\
         \x20 {suffix}                         service routes\n\
         \x20 <body>.{suffix}                  info page for a body\n\
         \x20 <moon>.<planet>.{suffix}         info page for a moon\n\
         \x20 <target>.<body>.{suffix}         proxy target via body\n\n\
         Routes:\n\
         \x20 /                  index or body info page\n\
         \x20 /health            liveness\n\
         \x20 /ready             readiness (distance table)\n\
         \x20 /api/status-data   JSON distance table\n\
         \x20 /_debug/distances  text distance table\n\
         \x20 /_debug/bodies     catalog listing\n\
         \x20 /_debug/domains    hostname per body\n\n\
         A destination may also be passed with the X-Destination header or\n\
         the ?destination= query parameter on a body host.\n"
    );
    text_response(StatusCode::OK, text)
}

/// Text distance table. Reading it refreshes a stale cache first.
pub(crate) fn debug_distances(ctx: &HttpContext) -> Response {
    let snapshot = match ctx.admission.ephemeris().snapshot(Utc::now()) {
        Ok(snapshot) => snapshot,
        Err(e) => return text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut text = format!(
        "distances from Earth at {}\n\n{:<20} {:>18} {:>14}  {}\n",
        snapshot.computed_at.to_rfc3339(),
        "body",
        "distance (km)",
        "one-way",
        "visibility"
    );
    let mut entries: Vec<_> = snapshot.entries.iter().collect();
    entries.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    for entry in entries {
        let visibility = match &entry.occluded_by {
            Some(occluder) => format!("occluded by {occluder}"),
            None => "visible".to_string(),
        };
        let _ = writeln!(
            text,
            "{:<20} {:>18.0} {:>14}  {}",
            entry.name,
            entry.distance_km,
            format_latency(entry.latency_seconds),
            visibility
        );
    }
    text_response(StatusCode::OK, text)
}

pub(crate) fn debug_bodies(ctx: &HttpContext) -> Response {
    let catalog = ctx.admission.ephemeris().catalog();
    let mut text = format!(
        "{:<20} {:<13} {:<10} {:>12}\n",
        "body", "class", "parent", "radius (km)"
    );
    for object in catalog.iter() {
        let _ = writeln!(
            text,
            "{:<20} {:<13} {:<10} {:>12.1}",
            object.name,
            class_label(object.class),
            object.parent.as_deref().unwrap_or("-"),
            object.radius_km
        );
    }
    text_response(StatusCode::OK, text)
}

pub(crate) fn debug_domains(ctx: &HttpContext) -> Response {
    let catalog = ctx.admission.ephemeris().catalog();
    let mut text = String::from("hostname per body\n\n");
    for object in catalog.iter() {
        let _ = writeln!(text, "{}", body_hostname(ctx, object));
    }
    text_response(StatusCode::OK, text)
}

pub(crate) fn index(ctx: &HttpContext) -> Response {
    let catalog = ctx.admission.ephemeris().catalog();
    let mut items = String::new();
    for object in catalog.iter() {
        let host = body_hostname(ctx, object);
        let _ = write!(
            items,
            "<li><a href=\"http://{host}/\">{}</a> ({})</li>",
            object.name,
            class_label(object.class)
        );
    }
    let html = format!(
        "<!doctype html><html><head><title>lightlag</title></head><body>\
         <h1>lightlag</h1>\
         <p>Interplanetary latency simulation proxy. Every relayed byte waits\n\
         the real one-way light-travel time to the chosen body.</p>\
         <ul>{items}</ul>\
         <p>See <a href=\"/_debug/help\">/_debug/help</a> for usage.</p>\
         </body></html>"
    );
    Html(html).into_response()
}

/// Info page for one body: live distance, latency, visibility.
pub(crate) fn body_info(ctx: &HttpContext, name: &str) -> Response {
    let ephemeris = ctx.admission.ephemeris();
    let Some(object) = ephemeris.catalog().get(name) else {
        return text_response(StatusCode::NOT_FOUND, format!("unknown body: {name}"));
    };
    let entry = match ephemeris.cached_entry(name, Utc::now()) {
        Ok(entry) => entry,
        Err(e) => return text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut facts = format!(
        "<tr><td>class</td><td>{}</td></tr>\
         <tr><td>distance from Earth</td><td>{:.0} km</td></tr>\
         <tr><td>one-way latency</td><td>{}</td></tr>\
         <tr><td>round-trip</td><td>{}</td></tr>\
         <tr><td>visibility</td><td>{}</td></tr>",
        class_label(object.class),
        entry.distance_km,
        format_latency(entry.latency_seconds),
        format_latency(entry.latency_seconds * 2.0),
        match &entry.occluded_by {
            Some(occluder) => format!("occluded by {occluder}"),
            None => "visible".to_string(),
        },
    );
    if let Some(parent) = &object.parent {
        let _ = write!(facts, "<tr><td>orbits</td><td>{parent}</td></tr>");
    }
    if let Some(info) = &object.spacecraft {
        let _ = write!(
            facts,
            "<tr><td>mission</td><td>{:?}</td></tr>",
            info.mission_status
        );
        if let Some(launch) = info.launch_date {
            let _ = write!(facts, "<tr><td>launched</td><td>{launch}</td></tr>");
        }
        if let Some(freq) = info.transmitter_frequency_hz {
            let _ = write!(
                facts,
                "<tr><td>transmitter</td><td>{:.1} GHz ({})</td></tr>",
                freq / 1e9,
                if info.transmitter_active { "active" } else { "inactive" }
            );
        }
    }

    let host = body_hostname(ctx, object);
    let html = format!(
        "<!doctype html><html><head><title>{name} — lightlag</title></head><body>\
         <h1>{name}</h1><table>{facts}</table>\
         <h2>Usage</h2>\
         <pre>curl http://example.com.{host}/\n\
         curl -H 'X-Destination: example.com' http://{host}/any/path</pre>\
         </body></html>"
    );
    Html(html).into_response()
}

fn body_hostname(ctx: &HttpContext, object: &CelestialObject) -> String {
    match (&object.parent, object.class) {
        (Some(parent), BodyClass::Moon) => {
            format!("{}.{}.{}", object.name, parent, ctx.suffix)
        }
        _ => format!("{}.{}", object.name, ctx.suffix),
    }
}

fn class_label(class: BodyClass) -> &'static str {
    match class {
        BodyClass::Star => "star",
        BodyClass::Planet => "planet",
        BodyClass::DwarfPlanet => "dwarf planet",
        BodyClass::Moon => "moon",
        BodyClass::Asteroid => "asteroid",
        BodyClass::Spacecraft => "spacecraft",
    }
}

/// Render seconds as `1h 23m 45s` (sub-minute values keep decimals).
pub(crate) fn format_latency(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.3}s");
    }
    let total = seconds.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else {
        format!("{m}m {s}s")
    }
}
