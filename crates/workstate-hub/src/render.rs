//! Server-side rendering of the dashboard page.
//!
//! The page is a plain HTML table refreshed by the browser through a meta
//! refresh, so every poll renders a fresh snapshot and no script is needed.
//! The template name ends in `.html`, which turns on auto-escaping for every
//! reporter-supplied value.

use minijinja::{context, Environment};
use std::time::Duration;
use workstate_core::{has_risk, DashboardSnapshot, Status};

const DASHBOARD_TEMPLATE: &str = "dashboard.html";

#[derive(Debug, Clone, Copy)]
pub struct ViewConfig {
    pub refresh_interval: Duration,
    pub advisory_threshold: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            advisory_threshold: 3,
        }
    }
}

pub struct DashboardPage {
    env: Environment<'static>,
    view: ViewConfig,
}

impl DashboardPage {
    pub fn new(view: ViewConfig) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("relative_time", relative_time);
        env.add_filter("status_class", status_class);
        env.add_test("risky", is_risky);
        env.add_template(
            DASHBOARD_TEMPLATE,
            include_str!("../templates/dashboard.html"),
        )?;
        Ok(Self { env, view })
    }

    pub fn render(&self, snapshot: &DashboardSnapshot) -> Result<String, minijinja::Error> {
        let threshold = self.view.advisory_threshold;
        let advisory = threshold > 0 && snapshot.counts.sessions >= threshold;
        self.env.get_template(DASHBOARD_TEMPLATE)?.render(context! {
            snapshot,
            advisory,
            refresh_secs => self.view.refresh_interval.as_secs().max(1),
            taken_at => snapshot.taken_at.format("%H:%M:%S UTC").to_string(),
        })
    }
}

fn status_class(status: &str) -> String {
    match Status::parse(status) {
        Status::Other(_) => "status-other".to_string(),
        known => format!("status-{}", known.as_str().to_lowercase()),
    }
}

fn is_risky(risk: &str) -> bool {
    has_risk(risk)
}

pub fn relative_time(idle_seconds: u64) -> String {
    if idle_seconds < 60 {
        format!("{idle_seconds}s ago")
    } else if idle_seconds < 3600 {
        format!("{}m ago", idle_seconds / 60)
    } else {
        format!("{}h ago", idle_seconds / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use workstate_core::{ReportFields, SessionStore};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn render(snapshot: &DashboardSnapshot, view: &ViewConfig) -> String {
        DashboardPage::new(*view)
            .expect("template compiles")
            .render(snapshot)
            .expect("template renders")
    }

    fn report(name: &str, task: &str, status: &str, risk: Option<&str>) -> ReportFields {
        ReportFields {
            name: Some(name.to_string()),
            task: Some(task.to_string()),
            status: Some(Status::parse(status)),
            risk: risk.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn page_refreshes_itself_and_lists_sessions_with_threads() {
        let store = SessionStore::default();
        store
            .upsert_session_at("s1", report("backend", "booting", "Up", None), t0())
            .await;
        store
            .upsert_thread_at("s1", "t1", report("tests", "running tests", "Running", None), t0())
            .await;
        let html = render(&store.snapshot_at(t0()).await, &ViewConfig::default());

        assert!(html.contains("<meta http-equiv=\"refresh\" content=\"5\">"));
        assert!(html.contains("<span class=\"session-name\">backend</span>"));
        assert!(html.contains("class=\"thread\" data-thread-id=\"t1\""));
        assert!(html.contains("running tests"));
        assert!(html.contains("dot-fresh"));
        assert!(html.contains("status-up"));
        assert!(html.find("data-session-id=\"s1\"") < html.find("data-thread-id=\"t1\""));
    }

    #[tokio::test]
    async fn staleness_drives_indicator_colour() {
        let store = SessionStore::default();
        store
            .upsert_session_at("s1", report("old", "", "Idle", None), t0())
            .await;
        let snapshot = store
            .snapshot_at(t0() + chrono::Duration::minutes(3))
            .await;
        let html = render(&snapshot, &ViewConfig::default());
        assert!(html.contains("dot-aging"));
        assert!(html.contains("3m ago"));

        let snapshot = store
            .snapshot_at(t0() + chrono::Duration::minutes(6))
            .await;
        assert!(render(&snapshot, &ViewConfig::default()).contains("dot-stale"));
    }

    #[tokio::test]
    async fn risk_is_highlighted_only_when_set() {
        let store = SessionStore::default();
        store
            .upsert_session_at("s1", report("a", "", "Running", Some("force-push pending")), t0())
            .await;
        store
            .upsert_session_at("s2", report("b", "", "Running", None), t0())
            .await;
        let html = render(&store.snapshot_at(t0()).await, &ViewConfig::default());
        assert!(html.contains("<td class=\"risk\">force-push pending</td>"));
        assert!(html.contains("<td class=\"risk-none\">-</td>"));
    }

    #[tokio::test]
    async fn reporter_text_is_escaped() {
        let store = SessionStore::default();
        store
            .upsert_session_at(
                "s1",
                report("<script>alert(1)</script>", "a & b", "<b>weird</b>", None),
                t0(),
            )
            .await;
        let html = render(&store.snapshot_at(t0()).await, &ViewConfig::default());
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;"));
        assert!(html.contains("title=\"a &amp; b\">a &amp; b</div>"));
        assert!(html.contains("status-other"));
        assert!(!html.contains("<b>weird</b>"));
        assert!(html.contains("&lt;b&gt;weird&lt;"));
    }

    #[tokio::test]
    async fn empty_store_renders_empty_state() {
        let store = SessionStore::default();
        let html = render(&store.snapshot_at(t0()).await, &ViewConfig::default());
        assert!(html.contains("No active sessions."));
        assert!(!html.contains("<table>"));
        assert!(!html.contains("class=\"advisory\""));
    }

    #[tokio::test]
    async fn advisory_banner_appears_at_threshold() {
        let store = SessionStore::default();
        for id in ["a", "b"] {
            store.upsert_session_at(id, ReportFields::default(), t0()).await;
        }
        let view = ViewConfig::default();
        assert!(!render(&store.snapshot_at(t0()).await, &view).contains("class=\"advisory\""));

        store.upsert_session_at("c", ReportFields::default(), t0()).await;
        let html = render(&store.snapshot_at(t0()).await, &view);
        assert!(html.contains("Advisory: 3 active sessions."));
    }

    #[tokio::test]
    async fn departed_sessions_are_listed() {
        let store = SessionStore::default();
        store
            .upsert_session_at("s1", report("backend", "deploy", "Running", None), t0())
            .await;
        store
            .upsert_session_at("s1", report("backend", "deploy", "Done", None), t0())
            .await;
        let html = render(&store.snapshot_at(t0()).await, &ViewConfig::default());
        assert!(html.contains("Recently finished"));
        assert!(html.contains("backend (done) &mdash; last task: deploy"));
    }

    #[tokio::test]
    async fn history_tooltip_lists_earlier_tasks() {
        let store = SessionStore::default();
        store.upsert_session_at("s1", ReportFields::default(), t0()).await;
        let html = render(&store.snapshot_at(t0()).await, &ViewConfig::default());
        assert!(html.contains("title=\"No earlier tasks\""));

        store
            .upsert_session_at("s1", report("a", "build", "Running", None), t0())
            .await;
        store
            .upsert_session_at("s1", report("a", "test", "Running", None), t0())
            .await;
        let html = render(&store.snapshot_at(t0()).await, &ViewConfig::default());
        assert!(html.contains("title=\"(no task)&#10;build\""));
    }

    #[tokio::test]
    async fn placeholder_session_is_tagged() {
        let store = SessionStore::default();
        store
            .upsert_thread_at("ghost", "t1", ReportFields::default(), t0())
            .await;
        let html = render(&store.snapshot_at(t0()).await, &ViewConfig::default());
        assert!(html.contains("<span class=\"session-name\">ghost</span><span class=\"placeholder\">(not reported yet)</span>"));
    }

    #[test]
    fn status_class_maps_known_and_unknown_statuses() {
        assert_eq!(status_class("AwaitingApproval"), "status-awaitingapproval");
        assert_eq!(status_class("Up"), "status-up");
        assert_eq!(status_class("Compiling"), "status-other");
    }

    #[test]
    fn relative_time_buckets() {
        assert_eq!(relative_time(0), "0s ago");
        assert_eq!(relative_time(59), "59s ago");
        assert_eq!(relative_time(60), "1m ago");
        assert_eq!(relative_time(3599), "59m ago");
        assert_eq!(relative_time(7200), "2h ago");
    }
}
