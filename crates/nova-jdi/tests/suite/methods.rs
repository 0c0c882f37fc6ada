use std::sync::Arc;

use nova_jdi::mock::MockTarget;
use nova_jdi::request::{LineEntry, LineTableData, Reply, Request, VariableData, VariableTableData};
use nova_jdi::{JdiError, Location, Method, MethodKind, Modifiers, ReferenceType, Session};

use super::support::{class, component, session_with};

const TYPE: u64 = 0x10;
const RUN: u64 = 1;
const NATIVE: u64 = 2;
const ABSTRACT: u64 = 3;
const STRIPPED: u64 = 4;

fn setup() -> (Arc<MockTarget>, Session, ReferenceType) {
    let target = Arc::new(MockTarget::new());
    target.reply(
        Request::Methods { type_id: TYPE },
        Reply::Components(vec![
            component(RUN, "run", "(ILjava/lang/String;)V", Modifiers::PUBLIC),
            component(NATIVE, "hash", "()I", Modifiers::NATIVE),
            component(ABSTRACT, "apply", "([J)Ljava/lang/Object;", Modifiers::ABSTRACT),
            component(STRIPPED, "<init>", "()V", 0),
        ]),
    );
    target.reply(
        Request::LineTable {
            type_id: TYPE,
            method_id: RUN,
        },
        Reply::LineTable(LineTableData {
            start: 0,
            end: 20,
            lines: vec![
                LineEntry { code_index: 12, line: 13 },
                LineEntry { code_index: 0, line: 10 },
                LineEntry { code_index: 5, line: 11 },
                LineEntry { code_index: 9, line: 10 },
            ],
        }),
    );
    target.reply(
        Request::VariableTable {
            type_id: TYPE,
            method_id: RUN,
        },
        Reply::VariableTable(VariableTableData {
            arg_count: 3,
            variables: vec![
                variable(0, "this", "Lcom/example/Task;", 21, 0),
                variable(0, "count", "I", 21, 1),
                variable(0, "label", "Ljava/lang/String;", 21, 2),
                variable(4, "tmp", "J", 8, 3),
            ],
        }),
    );
    target.fail(
        Request::LineTable {
            type_id: TYPE,
            method_id: STRIPPED,
        },
        101,
    );
    target.fail(
        Request::VariableTable {
            type_id: TYPE,
            method_id: STRIPPED,
        },
        101,
    );
    let session = session_with(&target);
    let ty = class(&session, TYPE, "Lcom/example/Task;");
    (target, session, ty)
}

fn variable(code_index: i64, name: &str, signature: &str, length: u32, slot: i32) -> VariableData {
    VariableData {
        code_index,
        name: name.to_string(),
        signature: signature.to_string(),
        generic_signature: String::new(),
        length,
        slot,
    }
}

fn method(ty: &ReferenceType, id: u64) -> Method {
    ty.method_by_id(id).unwrap()
}

#[test]
fn kinds_follow_modifiers_and_id() {
    let (_target, _session, ty) = setup();
    assert_eq!(method(&ty, RUN).kind(), MethodKind::Concrete);
    assert_eq!(method(&ty, NATIVE).kind(), MethodKind::NonConcrete);
    assert_eq!(method(&ty, ABSTRACT).kind(), MethodKind::NonConcrete);
    assert_eq!(method(&ty, 0).kind(), MethodKind::Obsolete);
    assert!(method(&ty, STRIPPED).is_constructor());
    assert!(matches!(
        ty.method_by_id(0x99),
        Err(JdiError::Protocol(_))
    ));
}

#[test]
fn line_table_is_sorted_and_cached() {
    let (target, _session, ty) = setup();
    let run = method(&ty, RUN);

    let lines: Vec<_> = run
        .all_line_locations()
        .unwrap()
        .iter()
        .map(|location| location.code_index())
        .collect();
    assert_eq!(lines, [0, 5, 9, 12]);

    let tens = run.locations_of_line(10).unwrap();
    assert_eq!(tens.len(), 2);
    assert_eq!(run.line_of(7).unwrap(), 11);
    assert_eq!(run.line_of(100).unwrap(), 13);
    assert_eq!(run.location().unwrap().unwrap().code_index(), 0);

    let request = Request::LineTable {
        type_id: TYPE,
        method_id: RUN,
    };
    assert_eq!(target.call_count(&request), 1);
}

#[test]
fn location_line_numbers_come_from_the_method() {
    let (_target, _session, ty) = setup();
    let location = Location::new(ty.clone(), RUN, 6, None);
    assert_eq!(location.line_number().unwrap(), 11);
    assert_eq!(location.method().unwrap().name(), "run");

    let earlier = Location::new(ty.clone(), RUN, 2, None);
    assert!(earlier < location);
}

#[test]
fn variables_split_into_arguments_and_locals() {
    let (_target, _session, ty) = setup();
    let run = method(&ty, RUN);

    let variables = run.variables().unwrap();
    assert_eq!(variables.len(), 4);

    let arguments: Vec<_> = run
        .arguments()
        .unwrap()
        .into_iter()
        .map(|variable| variable.name().to_string())
        .collect();
    assert_eq!(arguments, ["this", "count", "label"]);

    let tmp = run.variables_by_name("tmp").unwrap().remove(0);
    assert!(!tmp.is_argument());
    assert_eq!(tmp.type_name(), "long");
    assert!(tmp.is_visible(&Location::new(ty.clone(), RUN, 4, None)));
    assert!(tmp.is_visible(&Location::new(ty.clone(), RUN, 11, None)));
    assert!(!tmp.is_visible(&Location::new(ty.clone(), RUN, 12, None)));
    assert!(!tmp.is_visible(&Location::new(ty.clone(), NATIVE, 5, None)));
}

#[test]
fn absent_debug_information_is_reported_as_such() {
    let (_target, _session, ty) = setup();
    let stripped = method(&ty, STRIPPED);

    assert!(matches!(
        stripped.variables(),
        Err(JdiError::AbsentInformation(_))
    ));
    assert!(matches!(
        stripped.all_line_locations(),
        Err(JdiError::AbsentInformation(_))
    ));
    assert!(matches!(
        stripped.location(),
        Err(JdiError::AbsentInformation(_))
    ));
}

#[test]
fn native_and_abstract_methods_have_no_code() {
    let (target, _session, ty) = setup();
    let native = method(&ty, NATIVE);
    let abstract_ = method(&ty, ABSTRACT);

    let location = native.location().unwrap().unwrap();
    assert_eq!(location.code_index(), -1);
    assert_eq!(location.line_number().unwrap(), -1);
    assert!(abstract_.location().unwrap().is_none());

    for method in [&native, &abstract_] {
        assert!(method.all_line_locations().unwrap().is_empty());
        assert!(method.bytecodes().unwrap().is_empty());
        assert_eq!(method.line_of(0).unwrap(), -1);
        assert!(matches!(
            method.variables(),
            Err(JdiError::AbsentInformation(_))
        ));
        assert!(matches!(
            method.arguments(),
            Err(JdiError::AbsentInformation(_))
        ));
    }
    assert!(target
        .calls()
        .iter()
        .all(|request| !matches!(request, Request::LineTable { method_id: NATIVE | ABSTRACT, .. })));

    assert_eq!(abstract_.return_type_name().unwrap(), "java.lang.Object");
    assert_eq!(abstract_.argument_type_names().unwrap(), ["long[]"]);
    assert_eq!(abstract_.argument_signatures().unwrap(), ["[J"]);
}

#[test]
fn obsolete_methods_know_nothing() {
    let (target, _session, ty) = setup();
    let obsolete = method(&ty, 0);

    assert!(obsolete.is_obsolete().unwrap());
    assert_eq!(obsolete.return_type_name().unwrap(), "<unknown>");
    assert!(obsolete.argument_type_names().unwrap().is_empty());
    assert!(obsolete.argument_types().unwrap().is_empty());
    assert!(matches!(
        obsolete.return_type(),
        Err(JdiError::TypeNotLoaded { .. })
    ));
    assert!(obsolete.location().unwrap().is_none());
    assert!(obsolete.all_line_locations().unwrap().is_empty());
    assert!(target
        .calls()
        .iter()
        .all(|request| !matches!(request, Request::IsObsolete { .. })));
}

#[test]
fn concrete_methods_ask_the_target_about_obsolescence() {
    let (target, _session, ty) = setup();
    let request = Request::IsObsolete {
        type_id: TYPE,
        method_id: RUN,
    };
    target.reply(request.clone(), Reply::Bool(false));
    target.reply_once(request.clone(), Reply::Bool(true));

    let run = method(&ty, RUN);
    assert!(run.is_obsolete().unwrap());
    assert!(!run.is_obsolete().unwrap());
    assert_eq!(target.call_count(&request), 2);
}

#[test]
fn primitive_argument_types_resolve_without_the_target() {
    let (target, _session, ty) = setup();
    target.reply(
        Request::ClassesBySignature {
            signature: "Ljava/lang/String;".into(),
        },
        Reply::Types(Vec::new()),
    );
    let run = method(&ty, RUN);

    assert_eq!(run.argument_type_names().unwrap(), ["int", "java.lang.String"]);
    assert_eq!(run.return_type().unwrap(), nova_jdi::Type::Void);
    assert!(matches!(
        run.argument_types(),
        Err(JdiError::TypeNotLoaded { .. })
    ));
}

#[test]
fn variable_scope_near_the_end_of_the_index_range_saturates() {
    let target = Arc::new(MockTarget::new());
    target.reply(
        Request::Methods { type_id: 0x20 },
        Reply::Components(vec![component(1, "huge", "()V", Modifiers::STATIC)]),
    );
    target.reply(
        Request::VariableTable {
            type_id: 0x20,
            method_id: 1,
        },
        Reply::VariableTable(VariableTableData {
            arg_count: 0,
            variables: vec![variable(i64::MAX - 2, "late", "I", 10, 0)],
        }),
    );
    let session = session_with(&target);
    let ty = class(&session, 0x20, "Lcom/example/Huge;");
    let late = method(&ty, 1).variables().unwrap().remove(0);

    assert!(late.is_visible(&Location::new(ty.clone(), 1, i64::MAX, None)));
    assert!(!late.is_visible(&Location::new(ty.clone(), 1, i64::MAX - 3, None)));
}
