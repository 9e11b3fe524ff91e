//! Push notifications.
//!
//! Inbound push payloads become a display model; clicks are routed to an
//! existing same-origin window or to a newly opened one. Best effort only:
//! nothing is acknowledged back to the sender.

use chrono::Utc;
use clamflow_common::{NotificationDefaults, SwError, SwResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::clients::{ClientMatchOptions, ClientType, Clients};

/// Action ID that only dismisses the notification.
pub const ACTION_CLOSE: &str = "close";

/// Action ID that opens the application.
pub const ACTION_EXPLORE: &str = "explore";

/// Raw push message data, as delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushPayload {
    pub data: Option<Vec<u8>>,
}

impl PushPayload {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    /// A push with no data attached.
    pub fn empty() -> Self {
        Self { data: None }
    }

    /// Payload decoded as text, lossily.
    pub fn text(&self) -> Option<String> {
        self.data
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// The structured payload shape senders may use.
#[derive(Debug, Clone, Default, Deserialize)]
struct PushMessage {
    title: Option<String>,
    body: Option<String>,
    icon: Option<String>,
    badge: Option<String>,
    url: Option<String>,
    tag: Option<String>,
}

/// Button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// Data attached to a notification and handed back on click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: String,
    /// Arrival time (ms since epoch).
    pub date_of_arrival: i64,
}

/// Display model for one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub tag: Option<String>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build the display model for a push.
    ///
    /// JSON object payloads fill in whichever fields they carry. Anything
    /// else is shown verbatim as the body under the default title.
    pub fn from_push(payload: &PushPayload, defaults: &NotificationDefaults) -> Self {
        let message = match &payload.data {
            None => PushMessage::default(),
            Some(bytes) => match serde_json::from_slice::<PushMessage>(bytes) {
                Ok(message) => message,
                Err(err) => {
                    debug!(error = %err, "Push payload is not JSON, using it as text");
                    PushMessage {
                        body: payload.text(),
                        ..Default::default()
                    }
                }
            },
        };

        let icon = message.icon.unwrap_or_else(|| defaults.icon.clone());
        Self {
            title: message
                .title
                .unwrap_or_else(|| defaults.default_title.clone()),
            body: message.body.unwrap_or_else(|| defaults.default_body.clone()),
            badge: message.badge.unwrap_or_else(|| defaults.badge.clone()),
            vibrate: defaults.vibrate.clone(),
            tag: message.tag,
            data: NotificationData {
                url: message.url.unwrap_or_else(|| defaults.default_url.clone()),
                date_of_arrival: Utc::now().timestamp_millis(),
            },
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE.to_string(),
                    title: format!("Open {}", defaults.default_title),
                    icon: icon.clone(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: "Close notification".to_string(),
                    icon: icon.clone(),
                },
            ],
            icon,
        }
    }
}

/// A click on a displayed notification.
#[derive(Debug, Clone)]
pub struct NotificationClick {
    pub notification: Notification,
    /// Action button pressed, `None` for the notification body.
    pub action: Option<String>,
}

/// What a click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Dismissed only.
    Closed,
    /// An existing window was focused and navigated.
    Focused { client_id: String, url: Url },
    /// A new window was opened.
    Opened { client_id: String, url: Url },
}

/// Resolve a notification target against `origin`.
///
/// Targets that do not parse or leave the origin are replaced by `fallback`.
/// A fallback that itself leaves the origin is an error.
pub fn click_target(target: &str, origin: &Url, fallback: &str) -> SwResult<Url> {
    match origin.join(target) {
        Ok(url) if url.origin() == origin.origin() => return Ok(url),
        Ok(url) => warn!(url = %url, "Notification target is off-origin, using default"),
        Err(err) => warn!(url = target, error = %err, "Notification target is not a URL"),
    }

    let url = origin.join(fallback)?;
    if url.origin() != origin.origin() {
        return Err(SwError::push(format!("default target {} is off-origin", url)));
    }
    Ok(url)
}

/// Close the notification, then bring the user to its target URL.
///
/// Only same-origin targets are opened; anything else goes to `fallback`.
pub fn route_click(
    click: &NotificationClick,
    clients: &mut Clients,
    origin: &Url,
    fallback: &str,
) -> SwResult<ClickOutcome> {
    if click.action.as_deref() == Some(ACTION_CLOSE) {
        return Ok(ClickOutcome::Closed);
    }

    let target = click_target(&click.notification.data.url, origin, fallback)?;

    let options = ClientMatchOptions {
        include_uncontrolled: true,
        client_type: ClientType::Window,
    };
    let existing = clients
        .match_all(&options)
        .into_iter()
        .find(|c| c.same_origin(origin))
        .map(|c| c.id.clone());

    match existing {
        Some(id) => {
            clients.focus(&id)?;
            let client = clients.navigate(&id, target)?;
            info!(client = %client.id, url = %client.url, "Focused existing window");
            Ok(ClickOutcome::Focused {
                client_id: client.id,
                url: client.url,
            })
        }
        None => {
            let client = clients.open_window(target);
            info!(client = %client.id, url = %client.url, "Opened new window");
            Ok(ClickOutcome::Opened {
                client_id: client.id,
                url: client.url,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::Client;

    fn defaults() -> NotificationDefaults {
        NotificationDefaults::default()
    }

    fn origin() -> Url {
        Url::parse("http://localhost:3000/").unwrap()
    }

    fn click_on(url: &str) -> NotificationClick {
        let payload = PushPayload::new(serde_json::json!({ "url": url }).to_string());
        NotificationClick {
            notification: Notification::from_push(&payload, &defaults()),
            action: None,
        }
    }

    #[test]
    fn test_plain_text_payload() {
        let n = Notification::from_push(&PushPayload::new("Batch 42 ready"), &defaults());
        assert_eq!(n.title, "ClamFlow");
        assert_eq!(n.body, "Batch 42 ready");
        assert_eq!(n.icon, "/icons/icon-192x192.png");
        assert_eq!(n.vibrate, vec![100, 50, 100]);
        assert_eq!(n.data.url, "/dashboard");
    }

    #[test]
    fn test_json_payload() {
        let payload = PushPayload::new(
            r#"{"title":"QC","body":"Lot 7 approved","url":"/qc/lots/7","tag":"lot-7"}"#,
        );
        let n = Notification::from_push(&payload, &defaults());
        assert_eq!(n.title, "QC");
        assert_eq!(n.body, "Lot 7 approved");
        assert_eq!(n.data.url, "/qc/lots/7");
        assert_eq!(n.tag.as_deref(), Some("lot-7"));
        assert_eq!(n.badge, "/icons/icon-72x72.png");
    }

    #[test]
    fn test_json_non_object_is_text() {
        let n = Notification::from_push(&PushPayload::new("42"), &defaults());
        assert_eq!(n.body, "42");
    }

    #[test]
    fn test_empty_push() {
        let n = Notification::from_push(&PushPayload::empty(), &defaults());
        assert_eq!(n.body, "New ClamFlow notification");
    }

    #[test]
    fn test_actions() {
        let n = Notification::from_push(&PushPayload::empty(), &defaults());
        let ids: Vec<&str> = n.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(ids, vec![ACTION_EXPLORE, ACTION_CLOSE]);
        assert_eq!(n.actions[0].title, "Open ClamFlow");
    }

    #[test]
    fn test_click_opens_window_when_none_exist() {
        let n = Notification::from_push(&PushPayload::empty(), &defaults());
        let click = NotificationClick {
            notification: n,
            action: None,
        };
        let mut clients = Clients::new();

        let outcome = route_click(&click, &mut clients, &origin(), "/dashboard").unwrap();
        match outcome {
            ClickOutcome::Opened { url, .. } => assert_eq!(url.path(), "/dashboard"),
            other => panic!("expected Opened, got {:?}", other),
        }
        assert_eq!(clients.len(), 1);
    }

    #[test]
    fn test_click_focuses_same_origin_window() {
        let payload = PushPayload::new(r#"{"url":"/weight-notes"}"#);
        let n = Notification::from_push(&payload, &defaults());
        let click = NotificationClick {
            notification: n,
            action: Some(ACTION_EXPLORE.to_string()),
        };
        let mut clients = Clients::new();
        clients.add(Client::window(Url::parse("https://other.example.com/").unwrap()));
        let own = Client::window(Url::parse("http://localhost:3000/login").unwrap());
        let own_id = own.id.clone();
        clients.add(own);

        let outcome = route_click(&click, &mut clients, &origin(), "/dashboard").unwrap();
        assert_eq!(
            outcome,
            ClickOutcome::Focused {
                client_id: own_id.clone(),
                url: Url::parse("http://localhost:3000/weight-notes").unwrap(),
            }
        );
        assert!(clients.get(&own_id).unwrap().focused);
        assert_eq!(clients.len(), 2);
    }

    #[test]
    fn test_close_action_only_closes() {
        let n = Notification::from_push(&PushPayload::empty(), &defaults());
        let click = NotificationClick {
            notification: n,
            action: Some(ACTION_CLOSE.to_string()),
        };
        let mut clients = Clients::new();

        let outcome = route_click(&click, &mut clients, &origin(), "/dashboard").unwrap();
        assert_eq!(outcome, ClickOutcome::Closed);
        assert!(clients.is_empty());
    }

    #[test]
    fn test_click_off_origin_target_opens_default() {
        let mut clients = Clients::new();

        let outcome = route_click(
            &click_on("https://evil.example.com/x"),
            &mut clients,
            &origin(),
            "/dashboard",
        )
        .unwrap();
        match outcome {
            ClickOutcome::Opened { url, .. } => {
                assert_eq!(url.as_str(), "http://localhost:3000/dashboard")
            }
            other => panic!("expected Opened, got {:?}", other),
        }
    }

    #[test]
    fn test_click_off_origin_target_navigates_existing_to_default() {
        let mut clients = Clients::new();
        let own = Client::window(Url::parse("http://localhost:3000/login").unwrap());
        let own_id = own.id.clone();
        clients.add(own);

        let outcome = route_click(
            &click_on("//evil.example.com/phish"),
            &mut clients,
            &origin(),
            "/dashboard",
        )
        .unwrap();
        assert_eq!(
            outcome,
            ClickOutcome::Focused {
                client_id: own_id,
                url: Url::parse("http://localhost:3000/dashboard").unwrap(),
            }
        );
    }

    #[test]
    fn test_click_target_rejects_non_http_schemes() {
        let url = click_target("javascript:alert(1)", &origin(), "/dashboard").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/dashboard");
    }

    #[test]
    fn test_click_target_off_origin_default_is_push_error() {
        let err = click_target("https://evil.example.com/", &origin(), "https://evil.example.com/")
            .unwrap_err();
        assert!(matches!(err, SwError::Push(_)));
        assert_eq!(err.category(), "push");
    }
}
