//! Integration tests for reference resolution and viewer configuration

use std::io::Write;

use float_cmp::approx_eq;

use mivot::{
    ErrorCode, MivotError, ModelViewer,
    config::{MatchPolicy, ViewerConfig},
};

/// A VOTable whose template references the head of a chain of `depth`
/// GLOBALS instances, each referencing the next one.
fn nested_votable(depth: usize) -> String {
    let mut globals = String::new();
    for level in 0..depth {
        globals.push_str(&format!(
            r#"<INSTANCE dmtype="test:Level" dmid="_level{level}">
                 <ATTRIBUTE dmrole="test:Level.depth" dmtype="ivoa:real" value="{level}"/>"#
        ));
        if level + 1 < depth {
            globals.push_str(&format!(
                r#"<REFERENCE dmrole="test:Level.next" dmref="_level{}"/>"#,
                level + 1
            ));
        }
        globals.push_str("</INSTANCE>");
    }

    votable(
        &globals,
        r#"<INSTANCE dmtype="test:Root">
             <ATTRIBUTE dmrole="test:Root.flux" dmtype="ivoa:real" ref="flux"/>
             <REFERENCE dmrole="test:Root.next" dmref="_level0"/>
           </INSTANCE>"#,
    )
}

fn votable(globals: &str, template: &str) -> String {
    format!(
        r#"<VOTABLE version="1.4"><RESOURCE>
             <VODML>
               <MODEL name="test"/>
               <GLOBALS>{globals}</GLOBALS>
               <TEMPLATES tableref="Results">{template}</TEMPLATES>
             </VODML>
             <TABLE ID="Results">
               <FIELD name="flux" datatype="double" unit="mJy"/>
               <DATA><TABLEDATA>
                 <TR><TD>1.5</TD></TR>
                 <TR><TD>2.5</TD></TR>
               </TABLEDATA></DATA>
             </TABLE>
           </RESOURCE></VOTABLE>"#
    )
}

#[test]
fn test_nested_references_reach_every_level() {
    for depth in 1..=6 {
        let source = nested_votable(depth);
        let mut viewer = ModelViewer::from_votable_str(&source, ViewerConfig::default()).unwrap();
        let root = viewer.next_row_view().unwrap().expect("first row");

        let path = format!("{}depth", "next/".repeat(depth));
        let deepest = root.get_attribute(&path).unwrap();
        assert!(
            approx_eq!(f64, deepest.value().as_f64().unwrap(), (depth - 1) as f64),
            "depth {depth}"
        );

        let flux = root.attribute("flux").unwrap();
        assert!(approx_eq!(f64, flux.value().as_f64().unwrap(), 1.5));
        assert_eq!(flux.unit(), Some("mJy"));
    }
}

#[test]
fn test_pass_limit() {
    let source = nested_votable(4);

    let config = ViewerConfig::default().with_max_resolution_passes(4);
    let mut viewer = ModelViewer::from_votable_str(&source, config).unwrap();
    assert!(viewer.next_row_view().unwrap().is_some());

    let config = ViewerConfig::default().with_max_resolution_passes(3);
    let mut viewer = ModelViewer::from_votable_str(&source, config).unwrap();
    let err = viewer.next_row_view().unwrap_err();
    assert!(matches!(err, MivotError::Resolution(_)));
    assert!(err.has_code(ErrorCode::E303));
}

#[test]
fn test_cyclic_references() {
    let source = votable(
        r#"<INSTANCE dmtype="test:Node" dmid="_a">
             <REFERENCE dmrole="test:Node.peer" dmref="_b"/>
           </INSTANCE>
           <INSTANCE dmtype="test:Node" dmid="_b">
             <REFERENCE dmrole="test:Node.peer" dmref="_a"/>
           </INSTANCE>"#,
        r#"<INSTANCE dmtype="test:Root">
             <REFERENCE dmrole="test:Root.node" dmref="_a"/>
           </INSTANCE>"#,
    );
    let mut viewer = ModelViewer::from_votable_str(&source, ViewerConfig::default()).unwrap();
    let err = viewer.next_row_view().unwrap_err();
    assert!(err.has_code(ErrorCode::E302));
    assert!(err.to_string().contains("dmid:_a"));

    // The unresolved snapshot is still available.
    assert!(viewer.model_view(false).is_ok());
}

#[test]
fn test_cyclic_references_between_tables() {
    let source = r#"<VOTABLE version="1.4"><RESOURCE>
      <VODML>
        <MODEL name="test"/>
        <TEMPLATES tableref="Stars">
          <INSTANCE dmtype="test:Star">
            <PRIMARY_KEY ref="star"/>
            <ATTRIBUTE dmrole="test:Star.name" dmtype="ivoa:string" ref="star"/>
            <REFERENCE dmrole="test:Star.cluster" sourceref="Clusters">
              <FOREIGN_KEY ref="cluster"/>
            </REFERENCE>
          </INSTANCE>
        </TEMPLATES>
        <TEMPLATES tableref="Clusters">
          <INSTANCE dmtype="test:Cluster">
            <PRIMARY_KEY ref="cluster"/>
            <REFERENCE dmrole="test:Cluster.brightest" sourceref="Stars">
              <FOREIGN_KEY ref="brightest"/>
            </REFERENCE>
          </INSTANCE>
        </TEMPLATES>
      </VODML>
      <TABLE ID="Stars">
        <FIELD name="star" datatype="char" arraysize="*"/>
        <FIELD name="cluster" datatype="char" arraysize="*"/>
        <DATA><TABLEDATA><TR><TD>S1</TD><TD>C1</TD></TR></TABLEDATA></DATA>
      </TABLE>
      <TABLE ID="Clusters">
        <FIELD name="cluster" datatype="char" arraysize="*"/>
        <FIELD name="brightest" datatype="char" arraysize="*"/>
        <DATA><TABLEDATA><TR><TD>C1</TD><TD>S1</TD></TR></TABLEDATA></DATA>
      </TABLE>
    </RESOURCE></VOTABLE>"#;

    let config = ViewerConfig::default().with_tableref("Stars");
    let mut viewer = ModelViewer::from_votable_str(source, config).unwrap();
    let err = viewer.next_row_view().unwrap_err();
    assert!(matches!(err, MivotError::Resolution(_)));
    assert!(err.has_code(ErrorCode::E302));
    assert!(err.to_string().contains("Clusters["));
}

#[test]
fn test_missing_static_target() {
    let source = votable(
        "",
        r#"<INSTANCE dmtype="test:Root">
             <REFERENCE dmrole="test:Root.node" dmref="_nowhere"/>
           </INSTANCE>"#,
    );
    let mut viewer = ModelViewer::from_votable_str(&source, ViewerConfig::default()).unwrap();
    viewer.next_row().unwrap();
    assert!(viewer.instance_view().unwrap_err().has_code(ErrorCode::E300));
}

#[test]
fn test_dynamic_reference_to_globals_collection() {
    let source = votable(
        r#"<COLLECTION dmid="_frames">
             <INSTANCE dmtype="coords:SpaceFrame">
               <PRIMARY_KEY dmtype="ivoa:real" value="1.5"/>
               <ATTRIBUTE dmrole="coords:SpaceFrame.spaceRefFrame" dmtype="ivoa:string" value="FK5"/>
             </INSTANCE>
             <INSTANCE dmtype="coords:SpaceFrame">
               <PRIMARY_KEY dmtype="ivoa:real" value="2.5"/>
               <ATTRIBUTE dmrole="coords:SpaceFrame.spaceRefFrame" dmtype="ivoa:string" value="ICRS"/>
             </INSTANCE>
           </COLLECTION>"#,
        r#"<INSTANCE dmtype="test:Root">
             <REFERENCE dmrole="test:Root.frame" sourceref="_frames">
               <FOREIGN_KEY ref="flux"/>
             </REFERENCE>
           </INSTANCE>"#,
    );
    let mut viewer = ModelViewer::from_votable_str(&source, ViewerConfig::default()).unwrap();

    let frames: Vec<String> = std::iter::from_fn(|| {
        viewer.next_row_view().unwrap().map(|root| {
            root.get_attribute("frame/spaceRefFrame")
                .unwrap()
                .value()
                .as_str()
                .unwrap()
                .to_string()
        })
    })
    .collect();
    assert_eq!(frames, vec!["FK5".to_string(), "ICRS".to_string()]);
}

#[test]
fn test_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        tableref = "Results"
        dynamic_match = "first"
        max_resolution_passes = 8
        "#
    )
    .unwrap();

    let config = ViewerConfig::load(file.path()).unwrap();
    assert_eq!(config.tableref(), Some("Results"));
    assert_eq!(config.dynamic_match(), MatchPolicy::First);

    let viewer = ModelViewer::from_votable_str(&nested_votable(2), config).unwrap();
    assert_eq!(viewer.connected_tableref(), Some("Results"));
    assert_eq!(viewer.config().max_resolution_passes(), 8);
}

#[test]
fn test_config_errors() {
    let err = ViewerConfig::from_toml_str("dynamic_match = \"sometimes\"").unwrap_err();
    assert!(matches!(err, MivotError::Config(_)));

    let err = ViewerConfig::load("/nonexistent/mivot.toml").unwrap_err();
    assert!(matches!(err, MivotError::Io(_)));
}
