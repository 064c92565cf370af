//! Link graph output in DOT or GML
//!
//! The graph is a read-only projection of the record stream: every distinct
//! URL becomes a node, every record with a parent an edge from the parent's
//! node. Edges whose parent never showed up as a record are dropped. The
//! file is written once, at the end of the run.

use crate::checker::UrlRecord;
use crate::output::stats::CheckStatistics;
use crate::output::traits::{OutputResult, ResultSink};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Graph file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Dot,
    Gml,
}

#[derive(Debug, Clone)]
struct Node {
    id: usize,
    url: String,
    label: String,
    valid: bool,
}

/// Graph sink
#[derive(Debug)]
pub struct GraphLogger {
    path: PathBuf,
    format: GraphFormat,
    nodes: Vec<Node>,
    ids: HashMap<String, usize>,
    edges: Vec<(String, String)>,
}

impl GraphLogger {
    pub fn new(path: &Path, format: GraphFormat) -> Self {
        Self {
            path: path.to_path_buf(),
            format,
            nodes: Vec::new(),
            ids: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Resolved edges as node id pairs, deduplicated and sorted
    fn resolved_edges(&self) -> BTreeSet<(usize, usize)> {
        self.edges
            .iter()
            .filter_map(|(parent, child)| Some((*self.ids.get(parent)?, *self.ids.get(child)?)))
            .collect()
    }

    fn write_dot<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "digraph G {{")?;
        writeln!(out, "graph [")?;
        writeln!(out, "  charset=\"utf-8\",")?;
        writeln!(out, "];")?;
        for node in &self.nodes {
            writeln!(out, "  {} [", node.id)?;
            writeln!(out, "    label=\"{}\",", dot_quote(&node.label))?;
            writeln!(out, "    href=\"{}\",", dot_quote(&node.url))?;
            writeln!(out, "    valid={},", u8::from(node.valid))?;
            writeln!(out, "  ];")?;
        }
        for (source, target) in self.resolved_edges() {
            writeln!(out, "  {} -> {};", source, target)?;
        }
        writeln!(out, "}}")
    }

    fn write_gml<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "graph [")?;
        writeln!(out, "  directed 1")?;
        for node in &self.nodes {
            writeln!(out, "  node [")?;
            writeln!(out, "    id {}", node.id)?;
            writeln!(out, "    label \"{}\"", gml_quote(&node.label))?;
            writeln!(out, "    url \"{}\"", gml_quote(&node.url))?;
            writeln!(out, "    valid {}", u8::from(node.valid))?;
            writeln!(out, "  ]")?;
        }
        for (source, target) in self.resolved_edges() {
            writeln!(out, "  edge [")?;
            writeln!(out, "    source {}", source)?;
            writeln!(out, "    target {}", target)?;
            writeln!(out, "  ]")?;
        }
        writeln!(out, "]")
    }
}

fn dot_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn gml_quote(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

impl ResultSink for GraphLogger {
    fn name(&self) -> &str {
        match self.format {
            GraphFormat::Dot => "dot",
            GraphFormat::Gml => "gml",
        }
    }

    fn log_filter_url(&mut self, record: &UrlRecord, _do_print: bool) -> OutputResult<()> {
        let Some(url) = record.url.clone() else {
            return Ok(());
        };

        if !self.ids.contains_key(&url) {
            let id = self.nodes.len() + 1;
            let label = if record.name.is_empty() {
                url.clone()
            } else {
                record.name.clone()
            };
            self.ids.insert(url.clone(), id);
            self.nodes.push(Node {
                id,
                url: url.clone(),
                label,
                valid: record.valid,
            });
        }
        if let Some(parent) = &record.parent_url {
            self.edges.push((parent.clone(), url));
        }
        Ok(())
    }

    fn end_output(&mut self, _stats: &CheckStatistics) -> OutputResult<()> {
        let mut out = BufWriter::new(File::create(&self.path)?);
        match self.format {
            GraphFormat::Dot => self.write_dot(&mut out)?,
            GraphFormat::Gml => self.write_gml(&mut out)?,
        }
        out.flush()?;
        Ok(())
    }
}
