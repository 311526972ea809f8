//! The row-by-row mapping orchestrator.

use std::fmt;

use indexmap::IndexMap;
use log::{debug, info, log, trace};

use mivot_core::{
    instance::MivotInstance,
    table::{Resource, Table, Value, VoTable},
    tree::{NodeId, Tree},
    vocabulary::{FIRST_TABLE, ROOT_COLLECTION, Tag, attr},
};
use mivot_parser::{
    ViewBuilder,
    error::{Diagnostic, ErrorCode},
    parse_annotation, parse_votable,
};

use crate::{
    binding::{ColumnMaps, bind_columns, fill_values},
    config::ViewerConfig,
    error::MivotError,
    iterator::TableIterator,
    resolver::{ResolveContext, placeholders, resolve_all},
    seekers::{AnnotationSeeker, DmtypeSummary, ResourceSeeker},
    xml_view::XmlView,
};

/// Kind of element heading a TEMPLATES block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadKind {
    Instance,
    Collection,
}

impl fmt::Display for HeadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadKind::Instance => write!(f, "INSTANCE"),
            HeadKind::Collection => write!(f, "COLLECTION"),
        }
    }
}

/// The element heading a TEMPLATES block, as reported by [`ModelViewer::first_instance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadElement {
    pub kind: HeadKind,
    /// dmtype of the INSTANCE, or `root_collection` for a COLLECTION.
    pub dmtype: String,
}

/// A REFERENCE or JOIN taken out of the live template, with the place it
/// must be put back in a working copy.
#[derive(Debug, Clone)]
struct Placeholder {
    parent: NodeId,
    position: usize,
    definition: Tree,
}

impl Placeholder {
    /// JOINs and dynamic REFERENCEs depend on the keys of the current row.
    fn is_row_dependent(&self) -> bool {
        let root = self.definition.node(self.definition.root());
        root.tag() == &Tag::Join || root.attribute(attr::DMREF).is_none()
    }
}

/// State of the connected table.
#[derive(Debug, Clone)]
struct Connection {
    tableref: String,
    template_key: String,
    table_index: usize,
    maps: ColumnMaps,
    live: Tree,
    placeholders: Vec<Placeholder>,
    iterator: TableIterator,
    view: Option<MivotInstance>,
    warnings: Vec<Diagnostic>,
}

/// Interprets the MIVOT annotation of one VOTable resource over the rows of
/// one of its tables.
///
/// The viewer keeps the parsed annotation untouched. Connecting a table
/// copies its TEMPLATES into a live template with the REFERENCE and JOIN
/// elements set aside and ATTRIBUTE refs bound to columns. Every view is
/// built on a fresh copy of that live template, so views of different rows
/// never share state.
///
/// # Examples
///
/// ```
/// use mivot::{ModelViewer, config::ViewerConfig};
///
/// let source = r#"<VOTABLE>
///   <RESOURCE type="results">
///     <RESOURCE type="meta">
///       <VODML>
///         <TEMPLATES tableref="Results">
///           <INSTANCE dmtype="meas:Position">
///             <ATTRIBUTE dmrole="meas:Position.ra" dmtype="ivoa:RealQuantity" ref="ra"/>
///           </INSTANCE>
///         </TEMPLATES>
///       </VODML>
///     </RESOURCE>
///     <TABLE ID="Results">
///       <FIELD name="ra" datatype="double" unit="deg"/>
///       <DATA><TABLEDATA><TR><TD>10.5</TD></TR></TABLEDATA></DATA>
///     </TABLE>
///   </RESOURCE>
/// </VOTABLE>"#;
///
/// let mut viewer = ModelViewer::from_votable_str(source, ViewerConfig::default())?;
/// let position = viewer.next_row_view()?.expect("one row");
/// assert_eq!(position.attribute("ra")?.value().as_f64(), Some(10.5));
/// # Ok::<(), mivot::MivotError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ModelViewer {
    config: ViewerConfig,
    resource: Resource,
    source: String,
    seeker: AnnotationSeeker,
    connection: Option<Connection>,
}

impl ModelViewer {
    /// Build a viewer over a resource of `votable` and connect the table
    /// named by the configuration.
    ///
    /// # Arguments
    ///
    /// * `votable` - The document holding the annotated resource
    /// * `config` - Resource and table selection, dynamic match policy
    ///
    /// # Errors
    ///
    /// Returns `MivotError::Disabled` when the configuration turns annotations
    /// off, a binding error when the resource (`E100`), the TEMPLATES (`E101`,
    /// `E102`, `E106`) or the table (`E105`) cannot be found, and a parse
    /// error when the annotation block is absent (`E002`) or malformed.
    pub fn new(votable: &VoTable, config: ViewerConfig) -> Result<Self, MivotError> {
        if !config.enabled() {
            return Err(MivotError::Disabled);
        }

        let resource_number = config.resource_number();
        let resource = votable.resource(resource_number).cloned().ok_or_else(|| {
            Diagnostic::error(format!(
                "resource {resource_number} not found, the VOTable has {}",
                votable.resources().len()
            ))
            .with_code(ErrorCode::E100)
        })?;

        let source = resource
            .annotation_block()
            .ok_or_else(|| {
                Diagnostic::error("annotation block not found")
                    .with_code(ErrorCode::E002)
                    .with_help("the resource carries no VODML element")
            })?
            .to_string();

        // Step 1: Parse the annotation
        let tree = parse_annotation(&source).map_err(|err| MivotError::new_parse_error(err, &source))?;

        // Step 2: Index it
        let seeker = AnnotationSeeker::new(tree).map_err(|err| MivotError::new_parse_error(err, &source))?;
        info!(
            resource = resource_number,
            models = seeker.models().len(),
            templates = seeker.templates_tablerefs().len();
            "Annotation block read"
        );

        let tableref = config.tableref().unwrap_or(FIRST_TABLE).to_string();
        let mut viewer = Self {
            config,
            resource,
            source,
            seeker,
            connection: None,
        };

        // Step 3: Connect the table
        viewer.connect_table(&tableref)?;
        Ok(viewer)
    }

    /// Read a VOTable document and build a viewer over it.
    pub fn from_votable_str(source: &str, config: ViewerConfig) -> Result<Self, MivotError> {
        let votable = parse_votable(source).map_err(|err| MivotError::new_parse_error(err, source))?;
        Self::new(&votable, config)
    }

    /// Bind the viewer to the table mapped by the TEMPLATES of `tableref`.
    ///
    /// `first_table` selects the anonymous TEMPLATES, the only TEMPLATES,
    /// or the TEMPLATES naming the first table of the resource, in that order.
    /// Connecting resets the row cursor.
    ///
    /// # Errors
    ///
    /// `E101` for a tableref no TEMPLATES declares, `E102` when `first_table`
    /// is ambiguous, `E105` when the table is missing from the resource.
    pub fn connect_table(&mut self, tableref: &str) -> Result<(), MivotError> {
        let template_key = self.template_key(tableref)?;
        let resource = ResourceSeeker::new(&self.resource);
        let table_index = resource.table_index(&template_key).ok_or_else(|| {
            Diagnostic::error(format!("table `{template_key}` not found"))
                .with_code(ErrorCode::E105)
                .with_help(format!("the resource holds {:?}", resource.table_ids()))
        })?;
        let table = &self.resource.tables()[table_index];

        let block = self.seeker.templates_block(Some(&template_key))?;
        let mut live = self.seeker.tree().subtree(block);
        let root = live.root();

        let mut stripped = Vec::new();
        for placeholder in placeholders(&live, root) {
            let definition = live.subtree(placeholder);
            if let Some((parent, position)) = live.detach(placeholder) {
                stripped.push(Placeholder {
                    parent,
                    position,
                    definition,
                });
            }
        }

        let maps = ColumnMaps::for_table(table);
        let report = bind_columns(&mut live, root, &maps);
        for warning in &report.unmatched {
            log!(warning.severity().log_level(), tableref = template_key.as_str(); "{}", warning.message());
        }

        info!(
            tableref = template_key.as_str(),
            table = table.identifier(),
            rows = table.row_count(),
            bound = report.bound,
            placeholders = stripped.len();
            "Table connected"
        );

        self.connection = Some(Connection {
            tableref: tableref.to_string(),
            template_key,
            table_index,
            maps,
            live,
            placeholders: stripped,
            iterator: TableIterator::new(table.row_count()),
            view: None,
            warnings: report.unmatched,
        });
        Ok(())
    }

    /// Advance to the next row, returning `None` once the table is exhausted.
    pub fn next_row(&mut self) -> Result<Option<&[Value]>, MivotError> {
        let connection = self.connection.as_mut().ok_or(MivotError::NotConnected)?;
        let table = &self.resource.tables()[connection.table_index];
        Ok(connection
            .iterator
            .next()
            .map(|index| table.rows()[index].as_slice()))
    }

    /// The row the cursor is on.
    pub fn current_row(&self) -> Result<&[Value], MivotError> {
        let connection = self.connection()?;
        let index = connection.iterator.current()?;
        Ok(self.table(connection).rows()[index].as_slice())
    }

    /// Index of the row the cursor is on.
    pub fn current_row_index(&self) -> Result<usize, MivotError> {
        Ok(self.connection()?.iterator.current()?)
    }

    /// Move the cursor back before the first row.
    pub fn rewind(&mut self) -> Result<(), MivotError> {
        let connection = self.connection.as_mut().ok_or(MivotError::NotConnected)?;
        connection.iterator.rewind();
        debug!(tableref = connection.template_key.as_str(); "Table rewound");
        Ok(())
    }

    /// Materialize the current row as an XML snapshot of the TEMPLATES.
    ///
    /// The live template is copied; with `resolve_references` the set-aside
    /// REFERENCE and JOIN elements are put back and resolved, and the
    /// substituted content is bound to the table columns. Every bound
    /// ATTRIBUTE then receives the value of its column in the current row.
    ///
    /// # Errors
    ///
    /// Fails without a current row, and with the resolution error of the
    /// first placeholder that cannot be resolved. No partial snapshot is
    /// returned.
    pub fn model_view(&self, resolve_references: bool) -> Result<Tree, MivotError> {
        let connection = self.connection()?;
        let row_index = connection.iterator.current()?;
        let row = self.table(connection).rows()[row_index].as_slice();

        let mut snapshot = connection.live.clone();
        let root = snapshot.root();

        if resolve_references {
            for placeholder in connection.placeholders.iter().rev() {
                let definition = &placeholder.definition;
                snapshot.import(placeholder.parent, placeholder.position, definition, definition.root());
            }

            let ctx = ResolveContext::new(&self.seeker, ResourceSeeker::new(&self.resource), &connection.maps)
                .with_row(row)
                .with_policy(self.config.dynamic_match())
                .with_max_passes(self.config.max_resolution_passes());
            let stats = resolve_all(&mut snapshot, root, &ctx)?;
            bind_columns(&mut snapshot, root, &connection.maps);
            debug!(
                row = row_index,
                passes = stats.passes,
                substitutions = stats.substitutions;
                "References resolved"
            );
        }

        fill_values(&mut snapshot, root, row, false)?;
        trace!(row = row_index, nodes = snapshot.node_count(); "Snapshot built");
        Ok(snapshot)
    }

    /// Describe the element heading the TEMPLATES of `tableref`, or of the
    /// connected table when `tableref` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `E205` when the TEMPLATES holds neither INSTANCE nor COLLECTION.
    pub fn first_instance(&self, tableref: Option<&str>) -> Result<HeadElement, MivotError> {
        let key = match tableref {
            Some(tableref) => self.template_key(tableref)?,
            None => self.connection()?.template_key.clone(),
        };
        let block = self.seeker.templates_block(Some(&key))?;
        let head = self.seeker.head_element(block)?;
        let node = self.seeker.tree().node(head);

        Ok(match node.tag() {
            Tag::Collection => HeadElement {
                kind: HeadKind::Collection,
                dmtype: ROOT_COLLECTION.to_string(),
            },
            _ => HeadElement {
                kind: HeadKind::Instance,
                dmtype: node.dmtype().unwrap_or_default().to_string(),
            },
        })
    }

    /// Typed view of the single INSTANCE heading the resolved snapshot of
    /// the current row.
    ///
    /// # Errors
    ///
    /// Returns an `E201` structural error when the TEMPLATES holds zero or
    /// several top-level INSTANCE elements.
    pub fn instance_view(&self) -> Result<MivotInstance, MivotError> {
        let snapshot = self.model_view(true)?;
        Ok(ViewBuilder::new(&snapshot).instance_from_block(snapshot.root())?)
    }

    /// Advance to the next row and return its typed view.
    ///
    /// The view is built on the first row and then updated in place from
    /// each new row. A template holding dynamic references or joins is
    /// rebuilt on every row, since its foreign content follows the row keys.
    pub fn next_row_view(&mut self) -> Result<Option<&MivotInstance>, MivotError> {
        if self.next_row()?.is_none() {
            return Ok(None);
        }

        let connection = self.connection()?;
        let rebuild = connection.view.is_none()
            || connection.placeholders.iter().any(Placeholder::is_row_dependent);
        if rebuild {
            let view = self.instance_view()?;
            if let Some(connection) = self.connection.as_mut() {
                connection.view = Some(view);
            }
        } else if let Some(connection) = self.connection.as_mut() {
            let index = connection.iterator.current()?;
            let row = &self.resource.tables()[connection.table_index].rows()[index];
            if let Some(view) = connection.view.as_mut() {
                view.update(row);
            }
        }

        Ok(self.connection()?.view.as_ref())
    }

    /// The resolved snapshot of the current row, wrapped for queries.
    pub fn xml_view(&self) -> Result<XmlView, MivotError> {
        Ok(XmlView::new(self.model_view(true)?))
    }

    /// Identifiers of the tables of the resource.
    pub fn table_ids(&self) -> Vec<&str> {
        ResourceSeeker::new(&self.resource).table_ids()
    }

    /// Declared models: short name to schema URL.
    pub fn models(&self) -> IndexMap<String, Option<String>> {
        self.seeker.models()
    }

    pub fn globals_models(&self) -> DmtypeSummary {
        self.seeker.globals_summary()
    }

    pub fn templates_models(&self) -> IndexMap<String, DmtypeSummary> {
        self.seeker.templates_summary()
    }

    /// Tablerefs of the TEMPLATES blocks.
    pub fn mapped_tables(&self) -> Vec<&str> {
        self.seeker.templates_tablerefs()
    }

    /// The tableref given to the last successful [`Self::connect_table`].
    pub fn connected_tableref(&self) -> Option<&str> {
        self.connection
            .as_ref()
            .map(|connection| connection.tableref.as_str())
    }

    /// The TEMPLATES key the connected tableref resolved to.
    pub fn connected_template(&self) -> Option<&str> {
        self.connection
            .as_ref()
            .map(|connection| connection.template_key.as_str())
    }

    pub fn column_maps(&self) -> Option<&ColumnMaps> {
        self.connection.as_ref().map(|connection| &connection.maps)
    }

    /// The connected template with REFERENCE and JOIN elements set aside.
    pub fn live_template(&self) -> Option<&Tree> {
        self.connection.as_ref().map(|connection| &connection.live)
    }

    pub fn annotation_seeker(&self) -> &AnnotationSeeker {
        &self.seeker
    }

    /// Warnings raised while connecting the current table.
    pub fn warnings(&self) -> &[Diagnostic] {
        self.connection
            .as_ref()
            .map(|connection| connection.warnings.as_slice())
            .unwrap_or_default()
    }

    /// Text of the annotation block.
    pub fn annotation_source(&self) -> &str {
        &self.source
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    fn connection(&self) -> Result<&Connection, MivotError> {
        self.connection.as_ref().ok_or(MivotError::NotConnected)
    }

    fn table(&self, connection: &Connection) -> &Table {
        &self.resource.tables()[connection.table_index]
    }

    /// Key of the TEMPLATES serving `tableref`.
    fn template_key(&self, tableref: &str) -> Result<String, MivotError> {
        if tableref != FIRST_TABLE || self.seeker.has_templates(FIRST_TABLE) {
            self.seeker.templates_block(Some(tableref))?;
            return Ok(tableref.to_string());
        }

        match self.seeker.templates_block(None) {
            Ok(_) => Ok(self.seeker.templates_tablerefs()[0].to_string()),
            Err(ambiguous) if ambiguous.code() == Some(ErrorCode::E102) => {
                let first = self.resource.tables().first();
                self.seeker
                    .templates_tablerefs()
                    .into_iter()
                    .find(|tableref| {
                        first.is_some_and(|table| {
                            table.id() == Some(*tableref) || table.name() == Some(*tableref)
                        })
                    })
                    .map(str::to_string)
                    .ok_or_else(|| ambiguous.into())
            }
            Err(diagnostic) => Err(diagnostic.into()),
        }
    }
}
