use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

/// Anything that can move the console to another route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

const MAX_VISITED: usize = 32;

/// Current route of a console, observable by the render loop.
#[derive(Debug)]
pub struct History {
    current: watch::Sender<String>,
    visited: Mutex<VecDeque<String>>,
}

impl History {
    pub fn new(initial: impl Into<String>) -> Self {
        let initial = initial.into();
        let (current, _) = watch::channel(initial.clone());
        Self {
            current,
            visited: Mutex::new(VecDeque::from([initial])),
        }
    }

    pub fn current(&self) -> String {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.current.subscribe()
    }

    /// The most recent routes entered, oldest first.
    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl Navigator for History {
    fn navigate(&self, path: &str) {
        let changed = self.current.send_if_modified(|current| {
            if current == path {
                return false;
            }
            *current = path.to_string();
            true
        });

        if changed {
            tracing::debug!(path = path, "Navigated");
            let mut visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
            if visited.len() == MAX_VISITED {
                visited.pop_front();
            }
            visited.push_back(path.to_string());
        }
    }
}
