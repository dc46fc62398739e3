//! Plain-text rendering for console output.

use chrono::{DateTime, Utc};
use client_core::context::Preferences;
use shared::{
    domain::{Session, Task},
    protocol::{Query, QueryType, Scene, User},
};

pub fn session_line(session: &Session) -> String {
    let identity = &session.identity;
    let expires = DateTime::<Utc>::from_timestamp_millis(session.expires_at)
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| session.expires_at.to_string());
    format!(
        "{} ({}) id={} expires {expires}",
        identity.email.as_deref().unwrap_or("-"),
        identity.role.as_deref().unwrap_or("-"),
        identity.id.as_ref().map(|id| id.0.as_str()).unwrap_or("-"),
    )
}

pub fn user_line(user: &User) -> String {
    format!("{}\t{}\t{}", user.id, user.email, user.role)
}

pub fn query_type_line(query_type: &QueryType) -> String {
    format!(
        "{}\t{}\t{}\t{} / {} / {}",
        query_type.id,
        query_type.code,
        query_type.name,
        query_type.level2_scene,
        query_type.level3_scene,
        query_type.number
    )
}

pub fn scene_line(scene: &Scene) -> String {
    format!("{}: {}", scene.level2, scene.level3.join(", "))
}

pub fn query_line(query: &Query) -> String {
    let score = query
        .score
        .map(|score| format!("{score:.2}"))
        .unwrap_or_else(|| "-".into());
    format!(
        "{}\t{}\t{}\t{}\t{score}\t{}",
        query.id,
        query.query_type_code,
        query.filter_status.as_str(),
        query.manual_status.as_str(),
        query.text
    )
}

pub fn task_line(task: &Task) -> String {
    let mut line = format!(
        "[{:<9}] {:>3}% {}/{} {}",
        task.status.as_str(),
        task.progress,
        task.processed,
        task.total,
        task.name
    );
    if let Some(minutes) = task.estimated_remaining_minutes {
        line.push_str(&format!(" (~{minutes} min left)"));
    }
    if let Some(error) = &task.error {
        line.push_str(&format!(" error: {error}"));
    }
    line
}

pub fn preferences_line(preferences: &Preferences) -> String {
    format!(
        "dark mode: {}, language: {}",
        if preferences.dark_mode { "on" } else { "off" },
        preferences.language
    )
}
