//! Delegates populate the route table.
//!
//! The dispatcher calls [`Delegate::on_launch`] once before the server starts
//! accepting connections, and [`Delegate::configure_site`] whenever a site
//! description should be (re)loaded. In both cases the delegate receives a
//! private copy of the route table and registers handlers on it with
//! [`RouteTable::add_handler`] and [`RouteTable::set_default`]; the copy is
//! published only if the hook succeeds.

use std::path::{Path, PathBuf};

use anyhow::bail;

use crate::handlers::DirectoryHandler;
use crate::routing::RouteTable;

pub trait Delegate: Send + Sync {
    /// Name shown in logs and dumps
    fn name(&self) -> &str;

    /// Application setup; register routes here.
    fn on_launch(&self, _routes: &mut RouteTable) -> anyhow::Result<()> {
        Ok(())
    }

    /// Load a site description into `routes`.
    fn configure_site(&self, site: &Path, _routes: &mut RouteTable) -> anyhow::Result<()> {
        bail!(
            "delegate '{}' cannot load site file {}",
            self.name(),
            site.display()
        )
    }

    /// Append a description of the delegate's own state to a dump
    fn dump(&self, _out: &mut String) {}
}

/// Serves a directory tree for every `GET`.
#[derive(Debug, Clone)]
pub struct StaticDelegate {
    root: PathBuf,
}

impl StaticDelegate {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StaticDelegate { root: root.into() }
    }
}

impl Delegate for StaticDelegate {
    fn name(&self) -> &str {
        "static"
    }

    fn on_launch(&self, routes: &mut RouteTable) -> anyhow::Result<()> {
        log::info!("Serving static files from {}", self.root.display());
        routes.add_handler("GET", "/*", DirectoryHandler::new("/", self.root.clone()))?;
        Ok(())
    }

    fn dump(&self, out: &mut String) {
        out.push_str(&format!("static root: {}\n", self.root.display()));
    }
}
