//! CLI command implementations

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use copse_core::{CopierRef, CopySession};
use copse_store::{CopyPlan, Format, GraphDocument, NodeRef, Store, snapshot};

pub fn copy(
    plan_path: &Path,
    graph_path: &Path,
    root_label: &str,
    copier: Option<String>,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let plan = CopyPlan::from_path(plan_path)
        .with_context(|| format!("reading plan {}", plan_path.display()))?;
    let registry = plan.compile()?;
    let (store, labels) = load(graph_path)?;
    let root = root_of(&labels, root_label)?;

    let copier: CopierRef<Store> = match copier.or_else(|| plan.root.clone()) {
        Some(name) => CopierRef::Name(name),
        None => registry
            .resolve_polymorphic(&store.type_name(root)?, None)?
            .into(),
    };

    let mut session = CopySession::new(&store, &registry).with_options(plan.options.clone());
    let report = session
        .copy_with_report(&root, copier)
        .with_context(|| format!("copying `{root_label}`"))?;
    tracing::info!(
        "copied `{}` ({}) to {}: {} records in {:?}",
        root_label,
        root,
        report.target,
        report.visited,
        report.elapsed
    );

    let copied = store.export(report.target)?;
    match out {
        Some(path) => {
            copied.write_to(path)?;
            tracing::info!("wrote {} records to {}", copied.nodes.len(), path.display());
        }
        None => println!("{}", copied.render(Format::Json)?),
    }
    Ok(())
}

pub fn check(plan_path: &Path, graph_path: Option<&Path>) -> anyhow::Result<()> {
    let plan = CopyPlan::from_path(plan_path)
        .with_context(|| format!("reading plan {}", plan_path.display()))?;
    let schema = match graph_path {
        Some(path) => Some(
            GraphDocument::from_path(path)
                .with_context(|| format!("reading graph {}", path.display()))?
                .schema,
        ),
        None => None,
    };

    let problems = plan.check(schema.as_ref())?;
    if !problems.is_empty() {
        for problem in &problems {
            println!("{problem}");
        }
        bail!("{} problem(s) in {}", problems.len(), plan_path.display());
    }

    let registry = plan.compile()?;
    println!(
        "ok: {} copiers, {} type mappings",
        registry.len(),
        registry.type_mappings().len()
    );
    Ok(())
}

pub fn inspect(graph_path: &Path, root_label: &str, dot: bool) -> anyhow::Result<()> {
    let (store, labels) = load(graph_path)?;
    let root = root_of(&labels, root_label)?;
    let snapshot = snapshot::reachable(&store, root)?;

    if dot {
        print!("{}", snapshot.to_dot());
        return Ok(());
    }

    let names: BTreeMap<NodeRef, &str> = labels
        .iter()
        .map(|(label, id)| (*id, label.as_str()))
        .collect();
    for node in snapshot.nodes() {
        println!("{:<12} {}", names.get(&node.id).copied().unwrap_or("-"), node);
    }
    println!(
        "{} records, {} edges reachable from `{}`",
        snapshot.node_count(),
        snapshot.edge_count(),
        root_label
    );
    Ok(())
}

fn load(graph_path: &Path) -> anyhow::Result<(Store, BTreeMap<String, NodeRef>)> {
    let document = GraphDocument::from_path(graph_path)
        .with_context(|| format!("reading graph {}", graph_path.display()))?;
    Ok(Store::load_document(&document)?)
}

fn root_of(labels: &BTreeMap<String, NodeRef>, label: &str) -> anyhow::Result<NodeRef> {
    match labels.get(label) {
        Some(id) => Ok(*id),
        None => bail!("no record labelled `{label}` in the graph"),
    }
}
