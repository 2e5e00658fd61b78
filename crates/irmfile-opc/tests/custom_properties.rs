use irmfile_opc::{CustomPropertiesDoc, CustomProperty};

const EMPTY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes" />"#;

const SINGLE_PROPERTY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="1" name="PropName">
    <vt:lpwstr>PropValue</vt:lpwstr>
  </property>
</Properties>"#;

const MULTI_PROPERTY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="1" name="PropName0">
    <vt:lpwstr>PropValue0</vt:lpwstr>
  </property>
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="2" name="PropName1">
    <vt:lpwstr>PropValue1</vt:lpwstr>
  </property>
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="3" name="PropName2">
    <vt:lpwstr>PropValue2</vt:lpwstr>
  </property>
</Properties>"#;

const WRONG_PROPERTY_NODE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="1" name="PropName0">
    <vt:lpwstr>PropValue0</vt:lpwstr>
  </property>
  <wrong fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="2" name="PropName1">
    <vt:lpwstr>PropValue1</vt:lpwstr>
  </wrong>
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="3" name="PropName2">
    <vt:i4>2</vt:i4>
  </property>
</Properties>"#;

const WRONG_PROPERTY_SUB_NODE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="1" name="PropName0">
    <vt:lpwstr>PropValue0</vt:lpwstr>
  </property>
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="2" name="PropName1">
    <vt1:lpwstr>PropValue1</vt1:lpwstr>
  </property>
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="3" name="PropName2">
    <vt:i4>2</vt:i4>
  </property>
</Properties>"#;

#[test]
fn empty_properties_yield_no_tags() {
    let doc = CustomPropertiesDoc::parse(EMPTY_XML).expect("parse");
    assert!(doc.properties().is_empty());
}

#[test]
fn single_property_is_parsed() {
    let doc = CustomPropertiesDoc::parse(SINGLE_PROPERTY_XML).expect("parse");
    assert_eq!(
        doc.properties(),
        vec![CustomProperty::new("PropName", "PropValue")]
    );
}

#[test]
fn multiple_properties_are_parsed_in_order() {
    let doc = CustomPropertiesDoc::parse(MULTI_PROPERTY_XML).expect("parse");
    assert_eq!(
        doc.properties(),
        vec![
            CustomProperty::new("PropName0", "PropValue0"),
            CustomProperty::new("PropName1", "PropValue1"),
            CustomProperty::new("PropName2", "PropValue2"),
        ]
    );
}

#[test]
fn wrong_property_node_is_skipped() {
    let doc = CustomPropertiesDoc::parse(WRONG_PROPERTY_NODE_XML).expect("parse");
    assert_eq!(
        doc.properties(),
        vec![
            CustomProperty::new("PropName0", "PropValue0"),
            CustomProperty::new("PropName2", "2"),
        ]
    );
}

#[test]
fn wrong_value_namespace_is_skipped() {
    let doc = CustomPropertiesDoc::parse(WRONG_PROPERTY_SUB_NODE_XML).expect("parse");
    assert_eq!(
        doc.properties(),
        vec![
            CustomProperty::new("PropName0", "PropValue0"),
            CustomProperty::new("PropName2", "2"),
        ]
    );
}

#[test]
fn removing_properties_keeps_the_rest() {
    let mut doc = CustomPropertiesDoc::parse(MULTI_PROPERTY_XML).expect("parse");
    doc.update_properties(&[], &["PropName0", "PropName2"]);
    assert_eq!(
        doc.properties(),
        vec![CustomProperty::new("PropName1", "PropValue1")]
    );
}

#[test]
fn removing_the_same_key_twice_is_a_noop() {
    let mut doc = CustomPropertiesDoc::parse(MULTI_PROPERTY_XML).expect("parse");
    doc.update_properties(&[], &["PropName0", "PropName0"]);
    assert_eq!(doc.properties().len(), 2);
}

#[test]
fn removing_a_missing_key_is_a_noop() {
    let mut doc = CustomPropertiesDoc::parse(MULTI_PROPERTY_XML).expect("parse");
    doc.update_properties(&[], &["PropNameX", "PropNameY"]);
    assert_eq!(doc.properties().len(), 3);
}

#[test]
fn additions_are_appended_in_order() {
    let mut doc = CustomPropertiesDoc::parse(MULTI_PROPERTY_XML).expect("parse");
    let additions = vec![
        CustomProperty::new("PropName3", "PropValue3"),
        CustomProperty::new("PropName4", "PropValue4"),
    ];
    doc.update_properties(&additions, &[] as &[&str]);
    let properties = doc.properties();
    assert_eq!(properties.len(), 5);
    assert_eq!(properties[3], CustomProperty::new("PropName3", "PropValue3"));
    assert_eq!(properties[4], CustomProperty::new("PropName4", "PropValue4"));
}

#[test]
fn combined_add_and_remove() {
    let mut doc = CustomPropertiesDoc::parse(MULTI_PROPERTY_XML).expect("parse");
    let additions = vec![
        CustomProperty::new("PropName3", "PropValue3"),
        CustomProperty::new("PropName4", "PropValue4"),
    ];
    doc.update_properties(&additions, &["PropName0", "PropName2"]);
    let properties = doc.properties();
    assert_eq!(properties.len(), 3);
    assert!(properties.contains(&CustomProperty::new("PropName1", "PropValue1")));
    assert!(properties.contains(&CustomProperty::new("PropName3", "PropValue3")));
    assert!(properties.contains(&CustomProperty::new("PropName4", "PropValue4")));
}

const EXPECTED_SERIALIZED: &str = concat!(
    r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>"#,
    r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
    r#"<property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="2" name="PropName1">"#,
    r#"<vt:lpwstr>PropValue1</vt:lpwstr>"#,
    r#"</property>"#,
    r#"<property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="3" name="PropName3">"#,
    r#"<vt:lpwstr>PropValue3</vt:lpwstr>"#,
    r#"</property>"#,
    r#"<property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="4" name="PropName4">"#,
    r#"<vt:lpwstr>PropValue4</vt:lpwstr>"#,
    r#"</property>"#,
    r#"</Properties>"#,
);

#[test]
fn update_then_serialize_is_canonical() {
    let mut doc = CustomPropertiesDoc::parse(MULTI_PROPERTY_XML).expect("parse");
    let additions = vec![
        CustomProperty::new("PropName3", "PropValue3"),
        CustomProperty::new("PropName4", "PropValue4"),
    ];
    doc.update_properties(&additions, &["PropName0", "PropName2"]);
    assert_eq!(doc.serialize(), EXPECTED_SERIALIZED);
}

#[test]
fn parse_of_serialized_document_roundtrips() {
    let mut doc = CustomPropertiesDoc::parse(MULTI_PROPERTY_XML).expect("parse");
    doc.update_properties(
        &[CustomProperty::new("Sensitivity", "General")],
        &["PropName1"],
    );
    let serialized = doc.serialize();
    let reparsed = CustomPropertiesDoc::parse(&serialized).expect("reparse");
    assert_eq!(reparsed.properties(), doc.properties());
    assert_eq!(reparsed.serialize(), serialized);
}

#[test]
fn structural_xml_errors_fail_the_document() {
    let broken = r#"<?xml version="1.0"?><Properties><property name="x" pid="2"><vt:lpwstr>v</property></Properties>"#;
    assert!(CustomPropertiesDoc::parse(broken).is_err());
}

#[test]
fn i4_values_render_as_decimal_strings() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
  <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="2" name="Revision">
    <vt:i4>-17</vt:i4>
  </property>
</Properties>"#;
    let doc = CustomPropertiesDoc::parse(xml).expect("parse");
    assert_eq!(doc.properties(), vec![CustomProperty::new("Revision", "-17")]);
    assert!(doc.serialize().contains("<vt:i4>-17</vt:i4>"));
}
