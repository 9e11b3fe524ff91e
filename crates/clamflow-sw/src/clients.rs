//! Clients API: the window clients the worker can claim, focus, and open.

use std::sync::atomic::{AtomicU64, Ordering};

use clamflow_common::{SwError, SwResult};
use hashbrown::HashMap;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    All,
}

/// An open page or worker on the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub url: Url,
    pub client_type: ClientType,
    pub focused: bool,
    /// Set once the worker has claimed the client.
    pub controlled: bool,
}

impl Client {
    /// An uncontrolled, unfocused window at `url`.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: false,
            controlled: false,
        }
    }

    /// Whether the client shares an origin with `url`.
    pub fn same_origin(&self, url: &Url) -> bool {
        self.url.origin() == url.origin()
    }
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Registry of open clients.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Register a client, replacing any with the same ID.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Matching clients, ordered by ID.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<&Client> {
        let mut matched: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| options.include_uncontrolled || c.controlled)
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Take control of every client. Returns how many were newly claimed.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    /// Focus a window client.
    pub fn focus(&mut self, id: &str) -> SwResult<Client> {
        let client = self.window_mut(id)?;
        client.focused = true;
        let focused = client.clone();
        for other in self.clients.values_mut().filter(|c| c.id != id) {
            other.focused = false;
        }
        Ok(focused)
    }

    /// Navigate a window client to `url`.
    pub fn navigate(&mut self, id: &str, url: Url) -> SwResult<Client> {
        let client = self.window_mut(id)?;
        client.url = url;
        Ok(client.clone())
    }

    /// Open a new focused window client controlled by this worker.
    pub fn open_window(&mut self, url: Url) -> Client {
        for other in self.clients.values_mut() {
            other.focused = false;
        }
        let client = Client {
            focused: true,
            controlled: true,
            ..Client::window(url)
        };
        self.add(client.clone());
        client
    }

    fn window_mut(&mut self, id: &str) -> SwResult<&mut Client> {
        let client = self
            .clients
            .get_mut(id)
            .ok_or_else(|| SwError::NotFound(format!("client {}", id)))?;
        if client.client_type != ClientType::Window {
            return Err(SwError::state("Can only focus or navigate window clients"));
        }
        Ok(client)
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{:08}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
