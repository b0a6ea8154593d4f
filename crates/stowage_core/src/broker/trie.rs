//! Subscription trie.
//!
//! Every node carries its own lock. Walkers clone the child pointers they
//! need under a node's lock and release it before descending, so at most one
//! node lock is held at a time.

use crate::broker::subject::{GREATER, STAR};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One subscription: a connection's interest in a pattern.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Owning connection.
    pub id: u64,
    /// Monotonic subscription number, used to order queue group members.
    pub seq: u64,
    /// Queue group, if any.
    pub queue: Option<String>,
    pub(crate) sender: mpsc::Sender<Bytes>,
}

impl Subscriber {
    /// Returns true once the delivery task has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Default)]
struct NodeInner {
    children: HashMap<String, Arc<Node>>,
    star: Option<Arc<Node>>,
    greater: Option<Arc<Node>>,
    subs: Vec<Subscriber>,
}

#[derive(Default)]
pub(crate) struct Node {
    inner: RwLock<NodeInner>,
}

impl Node {
    fn child(&self, token: &str) -> Option<Arc<Node>> {
        let inner = self.inner.read();
        match token {
            STAR => inner.star.clone(),
            GREATER => inner.greater.clone(),
            t => inner.children.get(t).cloned(),
        }
    }

    fn child_or_insert(&self, token: &str) -> Arc<Node> {
        let mut inner = self.inner.write();
        let slot = match token {
            STAR => &mut inner.star,
            GREATER => &mut inner.greater,
            t => return Arc::clone(inner.children.entry(t.to_string()).or_default()),
        };
        Arc::clone(slot.get_or_insert_with(Arc::default))
    }

    fn all_children(&self) -> Vec<Arc<Node>> {
        let inner = self.inner.read();
        inner
            .children
            .values()
            .chain(inner.star.iter())
            .chain(inner.greater.iter())
            .cloned()
            .collect()
    }
}

/// The subscription trie.
#[derive(Default)]
pub(crate) struct Trie {
    root: Arc<Node>,
}

impl Trie {
    fn walk_to(&self, tokens: &[&str]) -> Option<Arc<Node>> {
        let mut node = Arc::clone(&self.root);
        for token in tokens {
            node = node.child(token)?;
        }
        Some(node)
    }

    /// Adds `sub` at the node for `tokens`, replacing a previous
    /// subscription of the same connection. Returns the replaced one.
    pub fn insert(&self, tokens: &[&str], sub: Subscriber) -> Option<Subscriber> {
        let mut node = Arc::clone(&self.root);
        for token in tokens {
            node = node.child_or_insert(token);
        }
        let mut inner = node.inner.write();
        match inner.subs.iter_mut().find(|s| s.id == sub.id) {
            Some(existing) => Some(std::mem::replace(existing, sub)),
            None => {
                inner.subs.push(sub);
                None
            }
        }
    }

    /// Removes connection `id`'s subscription at `tokens`.
    pub fn remove(&self, tokens: &[&str], id: u64) -> Option<Subscriber> {
        let node = self.walk_to(tokens)?;
        let mut inner = node.inner.write();
        let pos = inner.subs.iter().position(|s| s.id == id)?;
        Some(inner.subs.remove(pos))
    }

    /// Removes every subscription for which `drop_sub` returns true.
    pub fn remove_where(&self, drop_sub: impl Fn(&Subscriber) -> bool) -> Vec<Subscriber> {
        let mut removed = Vec::new();
        let mut stack = vec![Arc::clone(&self.root)];
        while let Some(node) = stack.pop() {
            {
                let mut inner = node.inner.write();
                let (gone, kept): (Vec<_>, Vec<_>) =
                    std::mem::take(&mut inner.subs).into_iter().partition(|s| drop_sub(s));
                inner.subs = kept;
                removed.extend(gone);
            }
            stack.extend(node.all_children());
        }
        removed
    }

    /// Collects subscribers whose pattern matches `tokens`.
    ///
    /// A subscription matches at its terminal node once all tokens are
    /// consumed, or at a `>` node reached with any number of tokens left,
    /// so `foo.>` also matches `foo`.
    pub fn matching(&self, tokens: &[&str]) -> Vec<Subscriber> {
        let mut matched = Vec::new();
        let mut stack = vec![(Arc::clone(&self.root), 0usize)];

        while let Some((node, depth)) = stack.pop() {
            let next = {
                let inner = node.inner.read();
                if depth == tokens.len() {
                    matched.extend(inner.subs.iter().cloned());
                    if let Some(greater) = &inner.greater {
                        matched.extend(greater.inner.read().subs.iter().cloned());
                    }
                    continue;
                }
                if let Some(greater) = &inner.greater {
                    stack.push((Arc::clone(greater), tokens.len()));
                }
                let mut next = Vec::with_capacity(2);
                if let Some(child) = inner.children.get(tokens[depth]) {
                    next.push(Arc::clone(child));
                }
                if let Some(star) = &inner.star {
                    next.push(Arc::clone(star));
                }
                next
            };
            stack.extend(next.into_iter().map(|n| (n, depth + 1)));
        }
        matched
    }

    /// Number of subscriptions in the trie.
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![Arc::clone(&self.root)];
        while let Some(node) = stack.pop() {
            count += node.inner.read().subs.len();
            stack.extend(node.all_children());
        }
        count
    }
}
