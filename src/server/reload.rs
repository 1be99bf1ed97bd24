//! Reload broadcasting
//!
//! The [`ReloadHub`] is a broadcast channel. Every open websocket holds a
//! receiver, so the set of connected clients is the set of live
//! subscribers. Tasks publish one [`ReloadMessage`] per completed run.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages buffered per slow client before it starts lagging
const CHANNEL_CAPACITY: usize = 64;

/// Path the reload client script is served from
pub const CLIENT_SCRIPT_PATH: &str = "/__sitepack/reload.js";

/// Path of the reload websocket
pub const SOCKET_PATH: &str = "/__sitepack/ws";

/// Notification sent to connected pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    /// Reload the whole page
    Reload,
    /// Swap the listed stylesheets (paths relative to the output root)
    Css { paths: Vec<String> },
}

impl ReloadMessage {
    /// JSON text frame for the websocket.
    pub fn to_json(&self) -> String {
        // Serializing a tagged enum of strings cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
    }
}

/// Broadcast hub for reload notifications.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Register a client.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send a message to every connected client; returns how many received it.
    pub fn publish(&self, message: ReloadMessage) -> usize {
        match self.sender.send(message) {
            Ok(n) => {
                tracing::debug!(clients = n, "reload notification sent");
                n
            }
            // No clients connected
            Err(_) => 0,
        }
    }
}

/// Client script injected into every served HTML page.
pub const CLIENT_SCRIPT: &str = r#"(function () {
  var proto = location.protocol === "https:" ? "wss://" : "ws://";
  function connect() {
    var ws = new WebSocket(proto + location.host + "/__sitepack/ws");
    ws.onmessage = function (event) {
      var msg;
      try { msg = JSON.parse(event.data); } catch (e) { return; }
      if (msg.type === "css") {
        var swapped = 0;
        var links = document.querySelectorAll('link[rel="stylesheet"]');
        msg.paths.forEach(function (path) {
          links.forEach(function (link) {
            var url = new URL(link.href);
            if (url.pathname.replace(/^\//, "") === path) {
              url.searchParams.set("sitepack", Date.now());
              link.href = url.toString();
              swapped++;
            }
          });
        });
        if (swapped === 0) { location.reload(); }
      } else {
        location.reload();
      }
    };
    ws.onclose = function () { setTimeout(connect, 1000); };
  }
  connect();
})();
"#;

/// Tag referencing the client script.
pub fn client_tag() -> String {
    format!(r#"<script src="{}"></script>"#, CLIENT_SCRIPT_PATH)
}

/// Insert the client tag before the last `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let tag = client_tag();
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..pos]);
            out.push_str(&tag);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json() {
        assert_eq!(ReloadMessage::Reload.to_json(), r#"{"type":"reload"}"#);
        let css = ReloadMessage::Css { paths: vec!["styles/main.css".to_string()] };
        assert_eq!(css.to_json(), r#"{"type":"css","paths":["styles/main.css"]}"#);
    }

    #[tokio::test]
    async fn test_hub_delivers_to_every_subscriber() {
        let hub = ReloadHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.client_count(), 2);

        assert_eq!(hub.publish(ReloadMessage::Reload), 2);
        assert_eq!(a.recv().await.unwrap(), ReloadMessage::Reload);
        assert_eq!(b.recv().await.unwrap(), ReloadMessage::Reload);
    }

    #[test]
    fn test_publish_without_clients() {
        let hub = ReloadHub::new();
        assert_eq!(hub.publish(ReloadMessage::Reload), 0);
    }

    #[test]
    fn test_dropped_receiver_leaves_client_set() {
        let hub = ReloadHub::new();
        let rx = hub.subscribe();
        drop(rx);
        assert_eq!(hub.client_count(), 0);
    }

    #[test]
    fn test_inject_before_body_close() {
        let out = inject_client("<html><body><p>x</p></BODY></html>");
        assert!(out.contains(r#"<p>x</p><script src="/__sitepack/reload.js"></script></BODY>"#));
    }

    #[test]
    fn test_inject_appends_without_body() {
        let out = inject_client("<p>fragment</p>");
        assert!(out.ends_with(&client_tag()));
    }

    #[test]
    fn test_client_script_uses_socket_path() {
        assert!(CLIENT_SCRIPT.contains(SOCKET_PATH));
    }
}
