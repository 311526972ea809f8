//! Substitution of REFERENCE and JOIN placeholders.
//!
//! A pass replaces every placeholder present when it starts. Substituted
//! content may bring new placeholders (a GLOBALS instance referencing
//! another one), so [`resolve_all`] runs passes until none are left.
//!
//! Every substituted subtree remembers where it came from. A placeholder
//! whose target is already one of its own ancestors, or one of the foreign
//! rows being materialized above it, closes a cycle and is reported instead
//! of being expanded again.

use log::{debug, trace};

use mivot_core::{
    span::Span,
    table::{Table, Value},
    tree::{NodeId, Tree},
    vocabulary::{Tag, attr},
};
use mivot_parser::error::{Diagnostic, ErrorCode};

use crate::{
    binding::{ColumnMaps, bind_columns, fill_values},
    config::MatchPolicy,
    seekers::{AnnotationSeeker, ResourceSeeker},
};

/// What a resolution pass can see besides the tree it rewrites.
#[derive(Debug, Clone)]
pub struct ResolveContext<'a> {
    seeker: &'a AnnotationSeeker,
    resource: ResourceSeeker<'a>,
    maps: &'a ColumnMaps,
    row: Option<&'a [Value]>,
    policy: MatchPolicy,
    max_passes: usize,
    chain: Vec<String>,
}

impl<'a> ResolveContext<'a> {
    /// Context for the table whose columns are described by `maps`.
    pub fn new(seeker: &'a AnnotationSeeker, resource: ResourceSeeker<'a>, maps: &'a ColumnMaps) -> Self {
        Self {
            seeker,
            resource,
            maps,
            row: None,
            policy: MatchPolicy::default(),
            max_passes: 32,
            chain: Vec::new(),
        }
    }

    /// The row whose keys drive dynamic references and joins.
    pub fn with_row(mut self, row: &'a [Value]) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Context for materializing one row of a foreign table.
    fn foreign<'b>(&self, maps: &'b ColumnMaps, row: &'b [Value], origin: &str) -> ResolveContext<'b>
    where
        'a: 'b,
    {
        let mut chain = self.chain.clone();
        chain.push(origin.to_string());
        ResolveContext {
            seeker: self.seeker,
            resource: self.resource,
            maps,
            row: Some(row),
            policy: self.policy,
            max_passes: self.max_passes,
            chain,
        }
    }
}

/// Counters reported by [`resolve_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Passes that substituted at least one placeholder.
    pub passes: usize,
    /// Placeholders substituted over all passes.
    pub substitutions: usize,
}

/// REFERENCE and JOIN elements reachable from `root`, in document order.
pub fn placeholders(tree: &Tree, root: NodeId) -> Vec<NodeId> {
    tree.descendants(root)
        .into_iter()
        .filter(|id| tree.node(*id).tag().is_placeholder())
        .collect()
}

/// Substitute every placeholder below `root`, returning how many were replaced.
///
/// # Errors
///
/// - `E300` when a target cannot be found or no foreign row matches
/// - `E301` when several foreign rows match under [`MatchPolicy::Unique`]
/// - `E302` when a substitution would repeat one of its ancestors
/// - `E304` when a key names no column
/// - `E305` when keys are needed and the context has no row
pub fn resolve_pass(tree: &mut Tree, root: NodeId, ctx: &ResolveContext<'_>) -> Result<usize, Diagnostic> {
    let pending = placeholders(tree, root);
    for &placeholder in &pending {
        let node = tree.node(placeholder);
        let is_join = node.tag() == &Tag::Join;
        let is_static = node.attribute(attr::DMREF).is_some();
        if is_join {
            resolve_join(tree, placeholder, ctx)?;
        } else if is_static {
            resolve_static(tree, placeholder, ctx)?;
        } else {
            resolve_dynamic(tree, placeholder, ctx)?;
        }
    }
    Ok(pending.len())
}

/// Run resolution passes until no placeholder is left.
///
/// # Errors
///
/// Returns `E303` if placeholders remain after the configured number of
/// passes, and any error of [`resolve_pass`].
pub fn resolve_all(tree: &mut Tree, root: NodeId, ctx: &ResolveContext<'_>) -> Result<ResolveStats, Diagnostic> {
    let mut stats = ResolveStats::default();
    loop {
        let remaining = placeholders(tree, root).len();
        if remaining == 0 {
            break;
        }
        if stats.passes >= ctx.max_passes {
            return Err(Diagnostic::error(format!(
                "{remaining} placeholders remain after {} resolution passes",
                stats.passes
            ))
            .with_code(ErrorCode::E303)
            .with_help("raise `max_resolution_passes` for deeply nested references"));
        }

        let substitutions = resolve_pass(tree, root, ctx)?;
        stats.passes += 1;
        stats.substitutions += substitutions;
        debug!(pass = stats.passes, substitutions; "Resolution pass done");
    }
    Ok(stats)
}

fn resolve_static(tree: &mut Tree, placeholder: NodeId, ctx: &ResolveContext<'_>) -> Result<(), Diagnostic> {
    let node = tree.node(placeholder);
    let dmref = node.attribute(attr::DMREF).unwrap_or_default().to_string();
    let role = node.dmrole().map(str::to_string);

    let target = ctx.seeker.globals_element_by_dmid(&dmref).map_err(|_| {
        not_found(tree, placeholder, format!("no GLOBALS element has dmid `{dmref}`"))
    })?;

    let origin = format!("dmid:{dmref}");
    check_cycle(tree, placeholder, &origin, ctx)?;
    substitute(tree, placeholder, ctx.seeker.tree(), target, role.as_deref(), &origin);
    trace!(dmref = dmref.as_str(); "Static reference resolved");
    Ok(())
}

fn resolve_dynamic(tree: &mut Tree, placeholder: NodeId, ctx: &ResolveContext<'_>) -> Result<(), Diagnostic> {
    let node = tree.node(placeholder);
    let sourceref = node.attribute(attr::SOURCEREF).unwrap_or_default().to_string();
    let role = node.dmrole().map(str::to_string);
    let foreign_keys: Vec<String> = tree
        .children_tagged(placeholder, &Tag::ForeignKey)
        .filter_map(|key| tree.node(key).attribute(attr::REF))
        .map(str::to_string)
        .collect();
    let keys = host_keys(tree, placeholder, foreign_keys.iter().map(String::as_str), ctx)?;
    let origin = format!("{sourceref}[{}]", display_keys(&keys));

    if ctx.seeker.globals_collection(&sourceref).is_ok() {
        let items = ctx.seeker.collection_items_by_keys(&sourceref, &keys)?;
        let item = select(tree, placeholder, &items, ctx.policy, &origin)?;
        check_cycle(tree, placeholder, &origin, ctx)?;
        substitute(tree, placeholder, ctx.seeker.tree(), item, role.as_deref(), &origin);
    } else if ctx.seeker.has_templates(&sourceref) {
        let table = foreign_table(tree, placeholder, &sourceref, ctx)?;
        let maps = ColumnMaps::for_table(table);
        let key_columns = primary_key_columns(tree, placeholder, &sourceref, ctx)?;
        let rows = matching_rows(tree, placeholder, table, &maps, &key_columns, &keys)?;
        let row = select(tree, placeholder, &rows, ctx.policy, &origin)?;

        check_cycle(tree, placeholder, &origin, ctx)?;
        let materialized = materialize_row(&sourceref, table, row, &origin, ctx)?;
        substitute(tree, placeholder, &materialized, materialized.root(), role.as_deref(), &origin);
    } else {
        return Err(not_found(
            tree,
            placeholder,
            format!("sourceref `{sourceref}` names neither a GLOBALS COLLECTION nor a TEMPLATES"),
        ));
    }

    trace!(sourceref = sourceref.as_str(), origin = origin.as_str(); "Dynamic reference resolved");
    Ok(())
}

fn resolve_join(tree: &mut Tree, placeholder: NodeId, ctx: &ResolveContext<'_>) -> Result<(), Diagnostic> {
    let node = tree.node(placeholder);
    let sourceref = node.attribute(attr::SOURCEREF).unwrap_or_default().to_string();
    let role = node.dmrole().map(str::to_string);
    let conditions: Vec<(String, String)> = tree
        .children_tagged(placeholder, &Tag::Where)
        .filter_map(|condition| {
            let condition = tree.node(condition);
            let foreign_key = condition.attribute(attr::FOREIGNKEY)?;
            let primary_key = condition.attribute(attr::PRIMARYKEY)?;
            Some((foreign_key.to_string(), primary_key.to_string()))
        })
        .collect();
    let keys = host_keys(
        tree,
        placeholder,
        conditions.iter().map(|(foreign_key, _)| foreign_key.as_str()),
        ctx,
    )?;

    // Each entry is a source tree, the node to copy and its origin.
    let mut copies: Vec<(Option<Tree>, NodeId, String)> = Vec::new();
    if let Ok(collection) = ctx.seeker.globals_collection(&sourceref) {
        let items = if keys.is_empty() {
            ctx.seeker.tree().children(collection).to_vec()
        } else {
            ctx.seeker.collection_items_by_keys(&sourceref, &keys)?
        };
        for (position, item) in items.into_iter().enumerate() {
            let origin = format!("{sourceref}#item{position}");
            check_cycle(tree, placeholder, &origin, ctx)?;
            copies.push((None, item, origin));
        }
    } else if ctx.seeker.has_templates(&sourceref) {
        let table = foreign_table(tree, placeholder, &sourceref, ctx)?;
        let maps = ColumnMaps::for_table(table);
        let key_columns: Vec<&str> = conditions
            .iter()
            .map(|(_, primary_key)| primary_key.as_str())
            .collect();
        for row in matching_rows(tree, placeholder, table, &maps, &key_columns, &keys)? {
            let origin = format!("{sourceref}#row{row}");
            check_cycle(tree, placeholder, &origin, ctx)?;
            let materialized = materialize_row(&sourceref, table, row, &origin, ctx)?;
            let root = materialized.root();
            copies.push((Some(materialized), root, origin));
        }
    } else {
        return Err(not_found(
            tree,
            placeholder,
            format!("JOIN sourceref `{sourceref}` names neither a GLOBALS COLLECTION nor a TEMPLATES"),
        ));
    }

    let Some((parent, position)) = tree.detach(placeholder) else {
        return Ok(());
    };
    let (target, mut position) = if tree.node(parent).tag() == &Tag::Collection {
        (parent, position)
    } else {
        let collection = tree.insert_child(parent, position, Tag::Collection);
        if let Some(role) = role {
            tree.node_mut(collection).set_attribute(attr::DMROLE, role);
        }
        tree.node_mut(collection).set_origin(format!("{sourceref}#join"));
        (collection, 0)
    };

    let joined = copies.len();
    for (source, node, origin) in copies {
        let source = source.as_ref().unwrap_or(ctx.seeker.tree());
        let copy = tree.import(target, position, source, node);
        tree.node_mut(copy).set_origin(origin);
        position += 1;
    }

    trace!(sourceref = sourceref.as_str(), joined; "Join resolved");
    Ok(())
}

/// Build the head INSTANCE of the TEMPLATES of `tableref` for one of its
/// rows: nested placeholders resolved, values filled and pinned.
fn materialize_row(
    tableref: &str,
    table: &Table,
    row_index: usize,
    origin: &str,
    ctx: &ResolveContext<'_>,
) -> Result<Tree, Diagnostic> {
    let block = ctx.seeker.templates_block(Some(tableref))?;
    let head = ctx
        .seeker
        .tree()
        .first_child_tagged(block, &Tag::Instance)
        .ok_or_else(|| {
            Diagnostic::error(format!("TEMPLATES `{tableref}` has no INSTANCE to materialize"))
                .with_code(ErrorCode::E300)
        })?;
    let row = table.row(row_index).ok_or_else(|| {
        Diagnostic::error(format!("table `{tableref}` has no row {row_index}")).with_code(ErrorCode::E300)
    })?;

    let maps = ColumnMaps::for_table(table);
    let mut materialized = ctx.seeker.tree().subtree(head);
    let root = materialized.root();

    let foreign = ctx.foreign(&maps, row, origin);
    resolve_all(&mut materialized, root, &foreign)?;
    bind_columns(&mut materialized, root, &maps);
    fill_values(&mut materialized, root, row, true)?;

    trace!(tableref, row = row_index; "Foreign row materialized");
    Ok(materialized)
}

/// Replace `placeholder` with a copy of `source_id`, giving it the role the
/// placeholder played.
fn substitute(
    tree: &mut Tree,
    placeholder: NodeId,
    source: &Tree,
    source_id: NodeId,
    role: Option<&str>,
    origin: &str,
) {
    if let Some(copy) = tree.replace(placeholder, source, source_id) {
        let node = tree.node_mut(copy);
        if let Some(role) = role {
            node.set_attribute(attr::DMROLE, role);
        }
        node.set_origin(origin);
    }
}

fn check_cycle(tree: &Tree, placeholder: NodeId, origin: &str, ctx: &ResolveContext<'_>) -> Result<(), Diagnostic> {
    let in_tree = tree
        .ancestors(placeholder)
        .any(|ancestor| tree.node(ancestor).origin() == Some(origin));
    let in_chain = ctx.chain.iter().any(|known| known == origin);
    if in_tree || in_chain {
        let node = tree.node(placeholder);
        return Err(Diagnostic::error(format!("cyclic reference through `{origin}`"))
            .with_code(ErrorCode::E302)
            .with_optional_label(node.span(), "reference closing the cycle")
            .with_help("a referenced element must not contain a reference back to itself"));
    }
    Ok(())
}

/// Values of the host columns named by `columns` in the context row.
fn host_keys<'c>(
    tree: &Tree,
    placeholder: NodeId,
    columns: impl Iterator<Item = &'c str>,
    ctx: &ResolveContext<'_>,
) -> Result<Vec<Value>, Diagnostic> {
    let columns: Vec<&str> = columns.collect();
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    let node = tree.node(placeholder);
    let row = ctx.row.ok_or_else(|| {
        Diagnostic::error(format!("{} needs a current row to read its keys", node.tag()))
            .with_code(ErrorCode::E305)
            .with_optional_label(node.span(), "row-dependent placeholder")
            .with_help("advance to a row before requesting a resolved view")
    })?;

    columns
        .into_iter()
        .map(|column| {
            ctx.maps
                .index(column)
                .and_then(|index| row.get(index))
                .cloned()
                .ok_or_else(|| unknown_column(node.span(), column))
        })
        .collect()
}

fn foreign_table<'a>(
    tree: &Tree,
    placeholder: NodeId,
    tableref: &str,
    ctx: &ResolveContext<'a>,
) -> Result<&'a Table, Diagnostic> {
    ctx.resource
        .table(tableref)
        .ok_or_else(|| not_found(tree, placeholder, format!("table `{tableref}` is not in the resource")))
}

/// Columns named by the PRIMARY_KEY elements of the head INSTANCE of `tableref`.
fn primary_key_columns<'a>(
    tree: &Tree,
    placeholder: NodeId,
    tableref: &str,
    ctx: &ResolveContext<'a>,
) -> Result<Vec<&'a str>, Diagnostic> {
    let annotation = ctx.seeker.tree();
    let block = ctx.seeker.templates_block(Some(tableref))?;
    let columns: Vec<&str> = annotation
        .first_child_tagged(block, &Tag::Instance)
        .map(|head| {
            annotation
                .children_tagged(head, &Tag::PrimaryKey)
                .filter_map(|key| annotation.node(key).attribute(attr::REF))
                .collect()
        })
        .unwrap_or_default();
    if columns.is_empty() {
        return Err(not_found(
            tree,
            placeholder,
            format!("TEMPLATES `{tableref}` declares no PRIMARY_KEY column"),
        ));
    }
    Ok(columns)
}

/// Indices of the rows of `table` whose `columns` equal `keys`, in table order.
fn matching_rows(
    tree: &Tree,
    placeholder: NodeId,
    table: &Table,
    maps: &ColumnMaps,
    columns: &[&str],
    keys: &[Value],
) -> Result<Vec<usize>, Diagnostic> {
    let indices = columns
        .iter()
        .map(|column| {
            maps.index(column)
                .ok_or_else(|| unknown_column(tree.node(placeholder).span(), column))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            indices
                .iter()
                .zip(keys)
                .all(|(index, key)| row.get(*index).is_some_and(|cell| cell.same_key(key)))
        })
        .map(|(position, _)| position)
        .collect())
}

fn select<T: Copy>(
    tree: &Tree,
    placeholder: NodeId,
    matches: &[T],
    policy: MatchPolicy,
    origin: &str,
) -> Result<T, Diagnostic> {
    match (matches, policy) {
        ([], _) => Err(not_found(tree, placeholder, format!("no foreign row matches `{origin}`"))),
        ([single], _) | ([single, ..], MatchPolicy::First) => Ok(*single),
        (several, MatchPolicy::Unique) => {
            let node = tree.node(placeholder);
            Err(Diagnostic::error(format!(
                "{} foreign rows match `{origin}`",
                several.len()
            ))
            .with_code(ErrorCode::E301)
            .with_optional_label(node.span(), "ambiguous reference")
            .with_help("set `dynamic_match = \"first\"` to keep the first match"))
        }
    }
}

fn display_keys(keys: &[Value]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn not_found(tree: &Tree, placeholder: NodeId, message: String) -> Diagnostic {
    let node = tree.node(placeholder);
    Diagnostic::error(message)
        .with_code(ErrorCode::E300)
        .with_optional_label(node.span(), "unresolved reference")
}

fn unknown_column(span: Option<Span>, column: &str) -> Diagnostic {
    Diagnostic::error(format!("key column `{column}` is not a column of the table"))
        .with_code(ErrorCode::E304)
        .with_optional_label(span, "key declared here")
}
