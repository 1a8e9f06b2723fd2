//! Forward links, derived backlinks and the document graph.
//!
//! A [`LinkGraph`] publishes immutable [`GraphSnapshot`]s. Rebuilds are
//! serialized by `build_lock` and assemble a complete snapshot off to the
//! side; the `RwLock` is only held to clone the current `Arc` or to swap in
//! the new one, so readers never wait for a scan and never see half of one.
//!
//! Nodes of the `petgraph` graph are documents, edges point from the linking
//! document to the resolved target:
//! - **Link**: wiki links and markdown links
//! - **Inclusion**: `[[!target]]` embeds, used for cycle reports

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use itertools::Itertools;
use petgraph::algo::tarjan_scc;
use petgraph::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{document_references, ReferenceKind, SkippedEntry, Workspace};
use crate::config::Settings;
use crate::documents::{DocumentSource, FsDocuments};
use crate::error::GraphError;
use crate::events::{GraphChange, GraphEvent, GraphEvents};
use crate::paths::{normalize, CanonicalPath};
use crate::resolve::{DocumentIndex, ResolvedTarget, TargetResolver};

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// One raw link target as written in its source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardLink {
    pub raw_target: String,
    pub kind: ReferenceKind,
}

/// The links of one document, in text order, duplicates kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardEntry {
    pub path: PathBuf,
    pub links: Vec<ForwardLink>,
}

impl ForwardEntry {
    pub fn targets(&self) -> impl Iterator<Item = &str> + '_ {
        self.links.iter().map(|link| link.raw_target.as_str())
    }
}

/// Source document -> its raw targets. Images never appear here.
pub type ForwardLinkMap = BTreeMap<CanonicalPath, ForwardEntry>;

/// Target document -> other documents linking to it, each listed once.
pub type BackLinkIndex = BTreeMap<CanonicalPath, Vec<PathBuf>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Link,
    Inclusion,
}

impl From<ReferenceKind> for EdgeKind {
    fn from(kind: ReferenceKind) -> Self {
        match kind {
            ReferenceKind::InclusionLink => EdgeKind::Inclusion,
            _ => EdgeKind::Link,
        }
    }
}

pub type DocumentGraph = DiGraph<PathBuf, EdgeKind>;

/// A forward link after resolution against the scanned documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLink {
    pub raw_target: String,
    pub kind: ReferenceKind,
    pub target: ResolvedTarget,
}

/// One consistent state of the index. Never mutated once published.
#[derive(Debug, Default)]
pub struct GraphSnapshot {
    root_dir: Option<PathBuf>,
    forward: ForwardLinkMap,
    backlinks: BackLinkIndex,
    resolved: BTreeMap<CanonicalPath, Vec<ResolvedLink>>,
    index: DocumentIndex,
    graph: DocumentGraph,
}

impl GraphSnapshot {
    fn derive(
        root_dir: Option<PathBuf>,
        forward: ForwardLinkMap,
        index: DocumentIndex,
        resolver: &TargetResolver,
    ) -> GraphSnapshot {
        // the scanned root is always searchable, wherever it lives
        let resolver = match &root_dir {
            Some(root) => resolver.allowing(root),
            None => resolver.clone(),
        };
        let resolved: BTreeMap<CanonicalPath, Vec<ResolvedLink>> = forward
            .par_iter()
            .map(|(key, entry)| {
                let links = entry
                    .links
                    .iter()
                    .map(|link| ResolvedLink {
                        raw_target: link.raw_target.clone(),
                        kind: link.kind,
                        target: resolver.resolve_in(&index, &link.raw_target, &entry.path),
                    })
                    .collect_vec();
                (key.clone(), links)
            })
            .collect();

        let mut graph = DocumentGraph::new();
        let node_index: HashMap<CanonicalPath, NodeIndex> = forward
            .iter()
            .map(|(key, entry)| (key.clone(), graph.add_node(entry.path.clone())))
            .collect();

        let mut backlinks = BackLinkIndex::new();
        for (key, links) in &resolved {
            let Some(source) = forward.get(key).map(|entry| &entry.path) else {
                continue;
            };

            for link in links {
                let Some(target) = link.target.path() else {
                    continue;
                };
                let target_key = normalize(target);

                // a document is never its own backlink
                if &target_key != key {
                    let sources = backlinks.entry(target_key.clone()).or_default();
                    if !sources.contains(source) {
                        sources.push(source.clone());
                    }
                }

                let kind = EdgeKind::from(link.kind);
                if let (Some(&from), Some(&to)) = (node_index.get(key), node_index.get(&target_key))
                {
                    if graph.edges_connecting(from, to).all(|edge| *edge.weight() != kind) {
                        graph.add_edge(from, to, kind);
                    }
                }
            }
        }

        GraphSnapshot {
            root_dir,
            forward,
            backlinks,
            resolved,
            index,
            graph,
        }
    }

    fn link_count(&self) -> usize {
        self.forward.values().map(|entry| entry.links.len()).sum()
    }

    fn unresolved_count(&self) -> usize {
        self.resolved
            .values()
            .flatten()
            .filter(|link| !link.target.is_found())
            .count()
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    pub fn forward(&self) -> &ForwardLinkMap {
        &self.forward
    }

    pub fn backlinks(&self) -> &BackLinkIndex {
        &self.backlinks
    }

    pub fn graph(&self) -> &DocumentGraph {
        &self.graph
    }

    /// Keys to try for a caller-supplied path, most specific first.
    fn candidate_keys(&self, path: &Path) -> Vec<CanonicalPath> {
        let mut keys = vec![normalize(path)];
        if path.is_relative() {
            if let Some(root) = &self.root_dir {
                keys.push(normalize(root.join(path)));
            }
        }
        keys
    }

    fn lookup<'a, V>(&self, map: &'a BTreeMap<CanonicalPath, V>, path: &Path) -> Option<&'a V> {
        self.candidate_keys(path)
            .iter()
            .find_map(|key| map.get(key))
            .or_else(|| {
                map.iter()
                    .find(|(key, _)| key.matches_spelling(path))
                    .map(|(_, value)| value)
            })
    }
}

/// Summary of one full rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub root_dir: PathBuf,
    pub documents: usize,
    pub links: usize,
    pub unresolved: usize,
    /// Walk errors and documents that could not be read
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub documents: usize,
    pub links: usize,
    pub resolved_links: usize,
    pub unresolved_links: usize,
    pub linked_documents: usize,
    pub inclusion_cycles: usize,
}

/// Thread-safe link index over one workspace.
pub struct LinkGraph {
    settings: Settings,
    resolver: TargetResolver,
    source: Arc<dyn DocumentSource>,
    state: RwLock<Arc<GraphSnapshot>>,
    build_lock: Mutex<()>,
    events: GraphEvents,
}

impl LinkGraph {
    pub fn new(settings: Settings) -> Self {
        Self::with_source(settings, Arc::new(FsDocuments))
    }

    /// Reads document text through `source`, e.g. open editor buffers.
    pub fn with_source(settings: Settings, source: Arc<dyn DocumentSource>) -> Self {
        LinkGraph {
            resolver: TargetResolver::new(&settings),
            events: GraphEvents::new(settings.event_capacity),
            settings,
            source,
            state: RwLock::new(Arc::new(GraphSnapshot::default())),
            build_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn events(&self) -> &GraphEvents {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    /// The current snapshot. Stays valid and unchanged across later rebuilds.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&read_lock(&self.state))
    }

    fn publish(&self, snapshot: GraphSnapshot) {
        *write_lock(&self.state) = Arc::new(snapshot);
    }

    /// Scans `root_dir`, resolves every link against the scanned documents
    /// and publishes the result in one swap.
    ///
    /// Readers keep seeing the previous snapshot until the swap. An unreadable
    /// root publishes an empty graph and returns the error; unreadable entries
    /// below it are listed in the report's `skipped`.
    ///
    /// # Arguments
    ///
    /// * `root_dir` - Workspace root to scan
    ///
    /// # Example
    ///
    /// ```ignore
    /// let graph = LinkGraph::new(Settings::default());
    /// let report = graph.build_from_scan(Path::new("/home/me/notes"))?;
    /// println!("{} documents, {} unresolved", report.documents, report.unresolved);
    /// let sources = graph.backlinks_for(Path::new("/home/me/notes/Guide.md"));
    /// ```
    pub fn build_from_scan(&self, root_dir: &Path) -> Result<ScanReport, GraphError> {
        let outcome = {
            let _build = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);

            match Workspace::discover(&self.settings, root_dir) {
                Ok(workspace) => {
                    let report = self.rebuild(&workspace);
                    Ok(report)
                }
                Err(err) => {
                    warn!(root = %root_dir.display(), error = %err, "workspace root unreadable");
                    self.publish(GraphSnapshot::default());
                    Err(err)
                }
            }
        };

        match &outcome {
            Ok(report) => {
                info!(
                    root = %report.root_dir.display(),
                    documents = report.documents,
                    links = report.links,
                    unresolved = report.unresolved,
                    "link graph rebuilt"
                );
                self.events.publish(GraphChange::Rebuilt {
                    documents: report.documents,
                    links: report.links,
                });
            }
            Err(_) => {
                self.events.publish(GraphChange::Cleared);
            }
        }

        outcome
    }

    fn rebuild(&self, workspace: &Workspace) -> ScanReport {
        let scanned = workspace.scan(&self.settings, self.source.as_ref());

        let mut skipped = workspace.skipped().to_vec();
        skipped.extend(scanned.iter().filter_map(|doc| {
            doc.read_error.as_ref().map(|reason| SkippedEntry {
                path: Some(doc.path.clone()),
                reason: reason.clone(),
            })
        }));

        let index = DocumentIndex::new(workspace.documents());
        let forward: ForwardLinkMap = scanned
            .into_iter()
            .map(|doc| {
                let links = doc
                    .references
                    .into_iter()
                    .filter(|reference| reference.kind.is_graph_edge())
                    .map(|reference| ForwardLink {
                        raw_target: reference.raw_target,
                        kind: reference.kind,
                    })
                    .collect();
                (
                    normalize(&doc.path),
                    ForwardEntry {
                        path: doc.path,
                        links,
                    },
                )
            })
            .collect();

        let snapshot = GraphSnapshot::derive(
            Some(workspace.root_dir().to_path_buf()),
            forward,
            index,
            &self.resolver,
        );

        let report = ScanReport {
            root_dir: workspace.root_dir().to_path_buf(),
            documents: snapshot.forward.len(),
            links: snapshot.link_count(),
            unresolved: snapshot.unresolved_count(),
            skipped,
        };

        self.publish(snapshot);
        report
    }

    /// Empties both maps.
    pub fn clear(&self) {
        {
            let _build = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.publish(GraphSnapshot::default());
        }
        debug!("link graph cleared");
        self.events.publish(GraphChange::Cleared);
    }

    /// Replaces the forward entry of one document with the links in `text`,
    /// adding the document if it is new, and re-derives backlinks.
    pub fn rescan_document(&self, path: &Path, text: &str) {
        let path = normalize(path).into_path_buf();
        {
            let _build = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let current = self.snapshot();

            let links = document_references(&self.settings, text, &path)
                .into_iter()
                .filter(|reference| reference.kind.is_graph_edge())
                .map(|reference| ForwardLink {
                    raw_target: reference.raw_target,
                    kind: reference.kind,
                })
                .collect();

            let mut forward = current.forward.clone();
            let mut index = current.index.clone();
            let key = normalize(&path);
            let stored = forward
                .get(&key)
                .map(|entry| entry.path.clone())
                .unwrap_or_else(|| path.clone());
            index.insert(&stored);
            forward.insert(key, ForwardEntry { path: stored, links });

            self.publish(GraphSnapshot::derive(
                current.root_dir.clone(),
                forward,
                index,
                &self.resolver,
            ));
        }
        debug!(path = %path.display(), "document rescanned");
        self.events.publish(GraphChange::DocumentUpdated { path });
    }

    /// Drops one document from the index.
    pub fn forget_document(&self, path: &Path) {
        let path = normalize(path).into_path_buf();
        {
            let _build = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let current = self.snapshot();

            let mut forward = current.forward.clone();
            let mut index = current.index.clone();
            if let Some(entry) = forward.remove(&normalize(&path)) {
                index.remove(&entry.path);
            }

            self.publish(GraphSnapshot::derive(
                current.root_dir.clone(),
                forward,
                index,
                &self.resolver,
            ));
        }
        debug!(path = %path.display(), "document forgotten");
        self.events.publish(GraphChange::DocumentUpdated { path });
    }

    /// Documents linking to `path`, each once, in path order. Empty when unknown.
    pub fn backlinks_for(&self, path: &Path) -> Vec<PathBuf> {
        let snapshot = self.snapshot();
        snapshot
            .lookup(&snapshot.backlinks, path)
            .cloned()
            .unwrap_or_default()
    }

    /// Raw targets of `path` in text order, duplicates kept.
    pub fn forward_links(&self, path: &Path) -> Vec<String> {
        let snapshot = self.snapshot();
        snapshot
            .lookup(&snapshot.forward, path)
            .map(|entry| entry.targets().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Resolved targets of `path`, each once, in text order.
    pub fn outgoing(&self, path: &Path) -> Vec<PathBuf> {
        let snapshot = self.snapshot();
        snapshot
            .lookup(&snapshot.resolved, path)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| link.target.path().map(Path::to_path_buf))
                    .unique()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every forward link of `path` with its resolution.
    pub fn resolved_links(&self, path: &Path) -> Vec<ResolvedLink> {
        let snapshot = self.snapshot();
        snapshot
            .lookup(&snapshot.resolved, path)
            .cloned()
            .unwrap_or_default()
    }

    /// Raw targets of `path` that match no scanned document.
    pub fn unresolved(&self, path: &Path) -> Vec<String> {
        self.resolved_links(path)
            .into_iter()
            .filter(|link| !link.target.is_found())
            .map(|link| link.raw_target)
            .collect()
    }

    /// All indexed documents in path order.
    pub fn documents(&self) -> Vec<PathBuf> {
        self.snapshot()
            .forward
            .values()
            .map(|entry| entry.path.clone())
            .collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        let snapshot = self.snapshot();
        snapshot.lookup(&snapshot.forward, path).is_some()
    }

    pub fn forward_map(&self) -> ForwardLinkMap {
        self.snapshot().forward.clone()
    }

    pub fn backlink_index(&self) -> BackLinkIndex {
        self.snapshot().backlinks.clone()
    }

    pub fn root_dir(&self) -> Option<PathBuf> {
        self.snapshot().root_dir.clone()
    }

    /// Groups of documents that include each other, directly or through others.
    pub fn inclusion_cycles(&self) -> Vec<Vec<PathBuf>> {
        inclusion_cycles(&self.snapshot())
    }

    pub fn stats(&self) -> GraphStats {
        let snapshot = self.snapshot();
        let links = snapshot.link_count();
        let unresolved_links = snapshot.unresolved_count();

        GraphStats {
            documents: snapshot.forward.len(),
            links,
            resolved_links: links - unresolved_links,
            unresolved_links,
            linked_documents: snapshot.backlinks.len(),
            inclusion_cycles: inclusion_cycles(&snapshot).len(),
        }
    }
}

impl std::fmt::Debug for LinkGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("LinkGraph")
            .field("root_dir", &snapshot.root_dir)
            .field("documents", &snapshot.forward.len())
            .field("events", &self.events)
            .finish()
    }
}

fn inclusion_cycles(snapshot: &GraphSnapshot) -> Vec<Vec<PathBuf>> {
    let inclusions = snapshot.graph.filter_map(
        |_, path| Some(path.clone()),
        |_, kind| (*kind == EdgeKind::Inclusion).then_some(()),
    );

    tarjan_scc(&inclusions)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|&node| inclusions.contains_edge(node, node))
        })
        .map(|component| {
            component
                .into_iter()
                .map(|node| inclusions[node].clone())
                .sorted()
                .collect_vec()
        })
        .sorted()
        .collect()
}
