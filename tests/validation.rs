//! Validator passes: structure, references, duplicates, cycles, schemas.

mod common;

use common::doc;
use flowscript::parser::parse_workflow;
use flowscript::validator::{
    ValidationErrorKind, ValidationOptions, detect_cycles, validate, validate_with,
};

fn ast_for(body: &str) -> flowscript::ast::WorkflowAst {
    parse_workflow(&doc(body), "t.flow.md").expect("parse")
}

#[test]
fn duplicate_ids_fail_validation() {
    let ast = ast_for(
        r#"<transform id="x" type="template"><template>a</template></transform>
           <transform id="x" type="template"><template>b</template></transform>"#,
    );
    let report = validate(&ast);
    assert!(!report.valid);
    assert!(
        report
            .errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::DuplicateNodeId)
    );
}

#[test]
fn duplicate_ids_are_checked_across_nesting() {
    let ast = ast_for(
        r#"<transform id="x" type="template"><template>a</template></transform>
           <if id="gate" condition="{{true}}">
             <then><set id="x" var="x" value="1"/></then>
           </if>"#,
    );
    assert!(!validate(&ast).valid);
}

#[test]
fn undefined_input_reference_is_an_error() {
    let ast = ast_for(r#"<sink id="out" type="http" input="ghost" url="x"/>"#);
    let report = validate(&ast);
    assert!(!report.valid);
    assert!(
        report
            .errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::UndefinedNodeRef
                && e.message.contains("ghost"))
    );
}

#[test]
fn template_node_references_must_resolve() {
    let ast = ast_for(
        r#"<transform id="t" type="template"><template>{{missing.output.title}}</template></transform>"#,
    );
    let report = validate(&ast);
    assert!(!report.valid);
    assert!(
        report
            .errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::UndefinedNodeRef)
    );
}

#[test]
fn undeclared_secret_is_an_error() {
    let source = "---\nname: t\nversion: 1.0\nsecrets:\n  - KNOWN\n---\n\
        <sink id=\"s\" type=\"http\" url=\"x\" token=\"{{$secrets.UNKNOWN}}\" input=\"s2\"/>\n\
        <source id=\"s2\" type=\"http\" url=\"y\" auth=\"{{$secrets.KNOWN}}\"/>\n";
    let ast = parse_workflow(source, "t.flow.md").expect("parse");
    let report = validate(&ast);
    assert!(!report.valid);
    let secret_errors: Vec<_> = report
        .errors
        .iter()
        .filter(|e| e.kind == ValidationErrorKind::UndefinedSecretRef)
        .collect();
    assert_eq!(secret_errors.len(), 1);
    assert!(secret_errors[0].message.contains("UNKNOWN"));
}

#[test]
fn cycle_reports_concrete_path_and_blocks_planning() {
    let ast = ast_for(
        r#"<transform id="P" type="map" input="Q" expression="{{$item}}"/>
           <transform id="Q" type="map" input="P" expression="{{$item}}"/>"#,
    );
    let report = validate(&ast);
    assert!(!report.valid);
    let cycle = report
        .errors
        .iter()
        .find(|e| e.kind == ValidationErrorKind::CircularDependency)
        .expect("cycle error");
    assert!(cycle.message.contains("P") && cycle.message.contains("Q"));
    assert!(cycle.message.contains("->"));

    assert!(!detect_cycles(&ast).is_empty());
    assert!(flowscript::planner::plan(&ast).is_err());
}

#[test]
fn acyclic_ast_plans_iff_no_cycles_detected() {
    let ast = ast_for(
        r#"<source id="a" type="http" url="x"/>
           <transform id="b" type="template" input="a"><template>t</template></transform>"#,
    );
    assert!(detect_cycles(&ast).is_empty());
    assert!(flowscript::planner::plan(&ast).is_ok());
}

#[test]
fn structural_warnings_promote_in_strict_mode() {
    // Sink without input warns; loop without bounds warns.
    let body = r#"<sink id="out" type="http" url="x"/>
                  <loop id="spin"><set id="v" var="v" value="1"/></loop>"#;
    let ast = ast_for(body);

    let relaxed = validate(&ast);
    assert!(relaxed.valid);
    assert!(relaxed.warnings.len() >= 2);

    let strict = validate_with(&ast, ValidationOptions { strict: true });
    assert!(!strict.valid);
    assert!(strict.warnings.is_empty());
}

#[test]
fn branch_requires_cases_and_when() {
    let ast = ast_for(r#"<branch id="b"><default><set id="d" var="d" value="1"/></default></branch>"#);
    let report = validate(&ast);
    assert!(!report.valid);

    let ast = ast_for(r#"<branch id="b"><case><set id="c" var="c" value="1"/></case></branch>"#);
    let report = validate(&ast);
    assert!(
        report
            .errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::MissingRequiredField && e.message.contains("when"))
    );
}

#[test]
fn invalid_duration_is_a_structural_error() {
    let ast = ast_for(r#"<delay id="nap" duration="soon"/>"#);
    let report = validate(&ast);
    assert!(!report.valid);
    assert!(
        report
            .errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::InvalidFieldType)
    );
}

#[test]
fn ai_schema_mismatch_warns() {
    let body = r#"
        <transform id="ai" type="ai" input="src" prompt="summarize" schema="{title: string, tags: string[]}"/>
        <source id="src" type="http" url="x"/>
        <transform id="use" type="template" input="ai"><template>{{ai.output.title}} / {{ai.output.nope}}</template></transform>
    "#;
    let ast = ast_for(body);
    let report = validate(&ast);
    assert!(report.valid, "schema mismatches are warnings: {:#?}", report.errors);
    let mismatches: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| w.kind == ValidationErrorKind::TypeMismatch)
        .collect();
    assert_eq!(mismatches.len(), 1, "only the bad path warns: {mismatches:#?}");
    assert!(mismatches[0].message.contains("nope"));
}

#[test]
fn numeric_attributes_must_be_positive() {
    let ast = ast_for(
        r#"<foreach id="each" collection="{{items}}" max-concurrency="0">
             <set id="v" var="v" value="1"/>
           </foreach>
           <set id="items" var="items" value="{{range(0, 3)}}"/>"#,
    );
    let report = validate(&ast);
    assert!(!report.valid);
    assert!(
        report
            .errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::InvalidFieldType
                && e.message.contains("max-concurrency"))
    );
}
