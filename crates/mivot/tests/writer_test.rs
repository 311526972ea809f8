//! Integration tests for writing annotation blocks
//!
//! Blocks built with MivotAnnotations are written into a plain VOTable and
//! read back through the ModelViewer.

use float_cmp::approx_eq;

use mivot::{ErrorCode, MivotAnnotations, MivotError, ModelViewer, config::ViewerConfig};

const PLAIN_VOTABLE: &str = r#"<?xml version="1.0"?>
<VOTABLE xmlns="http://www.ivoa.net/xml/VOTable/v1.3" version="1.4">
  <RESOURCE type="results">
    <TABLE ID="Results">
      <FIELD ID="_ra" name="ra" datatype="double" unit="deg"/>
      <FIELD name="obj" datatype="char" arraysize="*"/>
      <DATA><TABLEDATA>
        <TR><TD>10.5</TD><TD>M31</TD></TR>
        <TR><TD>83.8</TD><TD>M42</TD></TR>
      </TABLEDATA></DATA>
    </TABLE>
  </RESOURCE>
</VOTABLE>"#;

fn position_annotations() -> MivotAnnotations {
    let mut annotations = MivotAnnotations::new();
    annotations
        .add_model("meas", Some("https://www.ivoa.net/xml/Meas/20200908/Meas-v1.0.vo-dml.xml"))
        .add_model("coords", None);
    annotations
        .add_globals_xml(
            r#"<INSTANCE dmtype="coords:SpaceSys" dmid="_icrs">
                 <ATTRIBUTE dmrole="coords:SpaceSys.frame" dmtype="ivoa:string" value="ICRS"/>
               </INSTANCE>"#,
        )
        .unwrap();
    annotations
        .add_templates_xml(
            r#"<INSTANCE dmtype="meas:Position">
                 <ATTRIBUTE dmrole="meas:Position.ra" dmtype="ivoa:RealQuantity" ref="_ra"/>
                 <ATTRIBUTE dmrole="meas:Position.name" dmtype="ivoa:string" ref="obj"/>
                 <REFERENCE dmrole="meas:Position.coordSys" dmref="_icrs"/>
               </INSTANCE>"#,
        )
        .unwrap();
    annotations
}

#[test]
fn test_written_block_reads_back() {
    let mut annotations = position_annotations();
    annotations.build_mivot_block(Some("Results")).unwrap();
    let votable = annotations.insert_into_votable(PLAIN_VOTABLE, false).unwrap();

    let mut viewer = ModelViewer::from_votable_str(&votable, ViewerConfig::default()).unwrap();
    assert_eq!(viewer.connected_template(), Some("Results"));
    let models = viewer.models();
    assert_eq!(models.len(), 2);
    assert_eq!(models["coords"], None);
    assert!(viewer.warnings().is_empty());

    let first = viewer.next_row_view().unwrap().expect("first row");
    let ra = first.attribute("ra").unwrap();
    assert!(approx_eq!(f64, ra.value().as_f64().unwrap(), 10.5));
    assert_eq!(ra.unit(), Some("deg"));
    assert_eq!(first.get_attribute("coordSys/frame").unwrap().value().as_str(), Some("ICRS"));

    let second = viewer.next_row_view().unwrap().expect("second row");
    assert_eq!(second.attribute("name").unwrap().value().as_str(), Some("M42"));
    assert!(viewer.next_row_view().unwrap().is_none());
}

#[test]
fn test_annotated_votable_needs_replace() {
    let mut annotations = position_annotations();
    annotations.build_mivot_block(Some("Results")).unwrap();
    let votable = annotations.insert_into_votable(PLAIN_VOTABLE, false).unwrap();

    let err = annotations.insert_into_votable(&votable, false).unwrap_err();
    assert!(matches!(err, MivotError::Parse { .. }));
    assert!(err.has_code(ErrorCode::E005));

    annotations.set_report(true, "second pass");
    annotations.build_mivot_block(Some("Results")).unwrap();
    let rewritten = annotations.insert_into_votable(&votable, true).unwrap();
    assert_eq!(rewritten.matches("<VODML").count(), 1);
    assert!(rewritten.contains("second pass"));
    assert!(ModelViewer::from_votable_str(&rewritten, ViewerConfig::default()).is_ok());
}

#[test]
fn test_anonymous_templates_map_the_first_table() {
    let mut annotations = position_annotations();
    let block = annotations.build_mivot_block(None).unwrap();
    assert!(block.contains("<TEMPLATES>"));

    let votable = annotations.insert_into_votable(PLAIN_VOTABLE, false).unwrap();
    let viewer = ModelViewer::from_votable_str(&votable, ViewerConfig::default()).unwrap();
    assert_eq!(viewer.connected_template(), Some("first_table"));
}
