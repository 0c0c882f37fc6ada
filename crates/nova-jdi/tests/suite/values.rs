use std::sync::Arc;

use nova_jdi::mock::MockTarget;
use nova_jdi::request::{ObjectTag, Reply, Request, TaggedObjectId};
use nova_jdi::value::ObjectMirror;
use nova_jdi::{
    prepare_for_assignment, ClassObjectReference, Field, JdiError, ModuleReference,
    ObjectReference, PrimitiveKind, PrimitiveValue, StringReference, Value,
};

use super::support::{class, class_data, component, session_with};

#[test]
fn string_value_is_fetched_once() {
    let target = Arc::new(MockTarget::new());
    target.reply(
        Request::StringValue { object: 0x30 },
        Reply::String("hello".into()),
    );
    let session = session_with(&target);
    let string = StringReference::new(session.mirror_id(0x30));
    let copy = string.clone();

    assert_eq!(string.value().unwrap(), "hello");
    assert_eq!(copy.value().unwrap(), "hello");
    assert_eq!(target.call_count(&Request::StringValue { object: 0x30 }), 1);
}

#[test]
fn failed_string_fetch_is_retried_then_cached() {
    let target = Arc::new(MockTarget::new());
    let request = Request::StringValue { object: 0x31 };
    target.reply(request.clone(), Reply::String("late".into()));
    target.fail_once(request.clone(), 20);
    let session = session_with(&target);
    let string = StringReference::new(session.mirror_id(0x31));

    assert!(matches!(
        string.value(),
        Err(JdiError::CommandFailed { error_code: 20 })
    ));
    assert_eq!(string.value().unwrap(), "late");
    assert_eq!(target.call_count(&request), 2);

    assert_eq!(string.value().unwrap(), "late");
    assert_eq!(target.call_count(&request), 2);
}

#[test]
fn class_object_reflects_an_interned_type() {
    let target = Arc::new(MockTarget::new());
    target.reply(
        Request::ReflectedType { class_object: 0x40 },
        Reply::Type(class_data(0x400, "Ljava/util/List;")),
    );
    let session = session_with(&target);
    let class_object = ClassObjectReference::new(session.mirror_id(0x40));

    let reflected = class_object.reflected_type().unwrap();
    assert_eq!(reflected.name(), "java.util.List");
    assert_eq!(reflected, class(&session, 0x400, "Ljava/util/List;"));
    class_object.reflected_type().unwrap();
    assert_eq!(
        target.call_count(&Request::ReflectedType { class_object: 0x40 }),
        1
    );
}

#[test]
fn module_name_and_loader_are_optional() {
    let target = Arc::new(MockTarget::new());
    target.reply(Request::ModuleName { module: 1 }, Reply::String(String::new()));
    target.reply(Request::ModuleClassLoader { module: 1 }, Reply::Object(None));
    target.reply(Request::ModuleName { module: 2 }, Reply::String("app".into()));
    target.reply(
        Request::ModuleClassLoader { module: 2 },
        Reply::Object(Some(TaggedObjectId {
            tag: ObjectTag::Object,
            id: 0x77,
        })),
    );
    let session = session_with(&target);

    let unnamed = ModuleReference::new(session.mirror_id(1));
    assert_eq!(unnamed.name().unwrap(), None);
    assert_eq!(unnamed.class_loader().unwrap(), None);

    let named = ModuleReference::new(session.mirror_id(2));
    assert_eq!(named.name().unwrap().as_deref(), Some("app"));
    let loader = named.class_loader().unwrap().unwrap();
    assert_eq!(loader.id(), 0x77);
    assert_eq!(loader.tag(), ObjectTag::Object);
    named.name().unwrap();
    assert_eq!(target.call_count(&Request::ModuleName { module: 2 }), 1);
}

#[test]
fn runtime_type_is_cached_per_object() {
    let target = Arc::new(MockTarget::new());
    target.reply(
        Request::ObjectReferenceType { object: 5 },
        Reply::Type(class_data(0x50, "Lcom/example/Foo;")),
    );
    let session = session_with(&target);
    let object = ObjectMirror::new(session.mirror_id(5));

    assert_eq!(object.reference_type().unwrap().signature(), "Lcom/example/Foo;");
    object.reference_type().unwrap();
    assert_eq!(
        target.call_count(&Request::ObjectReferenceType { object: 5 }),
        1
    );
}

#[test]
fn tagged_ids_pick_the_matching_variant() {
    let target = Arc::new(MockTarget::new());
    let session = session_with(&target);
    let tagged = |tag| TaggedObjectId { tag, id: 3 };

    let value = Value::from_tagged(&session, Some(tagged(ObjectTag::Thread))).unwrap();
    assert!(value.as_object().unwrap().as_thread().is_some());
    assert!(ObjectReference::from_tagged(&session, tagged(ObjectTag::Module))
        .as_module()
        .is_some());
    assert!(Value::from_tagged(&session, None).is_none());
}

fn field(signature: &str, target: &Arc<MockTarget>) -> (nova_jdi::Session, Field) {
    let session = session_with(target);
    let ty = class(&session, 0x10, "Lcom/example/Holder;");
    let field = Field::new(ty, component(1, "slot", signature, 0));
    (session, field)
}

#[test]
fn assignment_converts_primitives_when_lossless() {
    let target = Arc::new(MockTarget::new());
    let (_session, long_field) = field("J", &target);

    let converted = prepare_for_assignment(Some(&Value::from(7i32)), &long_field).unwrap();
    assert_eq!(
        converted,
        Some(Value::Primitive(PrimitiveValue::Long(7)))
    );

    let (_session, byte_field) = field("B", &target);
    assert!(matches!(
        prepare_for_assignment(Some(&Value::from(300i32)), &byte_field),
        Err(JdiError::InvalidConversion(_))
    ));
    assert!(matches!(
        prepare_for_assignment(Some(&Value::from(true)), &byte_field),
        Err(JdiError::InvalidConversion(_))
    ));
}

#[test]
fn assignment_of_null_and_references() {
    let target = Arc::new(MockTarget::new());
    let (session, string_field) = field("Ljava/lang/String;", &target);
    let (_other_session, int_field) = field("I", &target);

    assert_eq!(prepare_for_assignment(None, &string_field).unwrap(), None);
    assert!(matches!(
        prepare_for_assignment(None, &int_field),
        Err(JdiError::InvalidConversion(_))
    ));
    assert!(matches!(
        prepare_for_assignment(Some(&Value::from(1i32)), &string_field),
        Err(JdiError::InvalidConversion(_))
    ));
    assert!(matches!(
        prepare_for_assignment(Some(&Value::Void), &string_field),
        Err(JdiError::InvalidConversion(_))
    ));

    let local = Value::Object(ObjectReference::String(StringReference::new(
        session.mirror_id(8),
    )));
    assert_eq!(
        prepare_for_assignment(Some(&local), &string_field).unwrap(),
        Some(local.clone())
    );
    assert!(matches!(
        prepare_for_assignment(Some(&local), &int_field),
        Err(JdiError::InvalidConversion(_))
    ));

    let foreign_session = session_with(&target);
    let foreign = Value::Object(ObjectReference::String(StringReference::new(
        foreign_session.mirror_id(8),
    )));
    assert!(matches!(
        prepare_for_assignment(Some(&foreign), &string_field),
        Err(JdiError::SessionMismatch { .. })
    ));
}

#[test]
fn checked_and_unchecked_casts_disagree_only_on_loss() {
    let wide = PrimitiveValue::Long(1 << 40);
    assert_eq!(wide.cast(PrimitiveKind::Int), PrimitiveValue::Int(0));
    assert!(matches!(
        wide.checked_cast(PrimitiveKind::Int),
        Err(JdiError::InvalidConversion(_))
    ));
    assert_eq!(
        PrimitiveValue::Char(u16::from(b'A')).checked_cast(PrimitiveKind::Byte).unwrap(),
        PrimitiveValue::Byte(65)
    );
    assert_eq!(PrimitiveValue::Char(u16::from(b'A')).to_string(), "'A'");
}
