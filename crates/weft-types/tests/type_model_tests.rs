use std::sync::Arc;

use pretty_assertions::assert_eq;
use weft_types::reflect;
use weft_types::{
    well_known, AttributeArgument, AttributeBuilder, AttributeValue, CallError, ConstructorBuilder,
    MethodBuilder, ModuleInfo, ObjectRef, ParameterDef, Ty, TypeBuilder, TypeError, TypeRef, Value,
    Visibility,
};

fn animals() -> (TypeRef, TypeRef, TypeRef) {
    let speaker = TypeBuilder::interface("ISpeaker")
        .method(MethodBuilder::new("Speak").returns(Ty::Str))
        .build()
        .unwrap();
    let animal = TypeBuilder::class("Animal")
        .as_abstract()
        .implements(&speaker)
        .method(MethodBuilder::new("Speak").returns(Ty::Str).as_abstract())
        .method(
            MethodBuilder::new("Legs")
                .returns(Ty::Int)
                .as_virtual()
                .with_body(|_| Ok(Value::Int(4))),
        )
        .build()
        .unwrap();
    let bird = TypeBuilder::class("Bird")
        .extends(&animal)
        .method(
            MethodBuilder::new("Speak")
                .returns(Ty::Str)
                .as_override()
                .with_body(|_| Ok(Value::from("tweet"))),
        )
        .method(
            MethodBuilder::new("Legs")
                .returns(Ty::Int)
                .as_override()
                .as_sealed()
                .with_body(|_| Ok(Value::Int(2))),
        )
        .build()
        .unwrap();
    (speaker, animal, bird)
}

// ============================================================================
// Hierarchy Tests
// ============================================================================

#[test]
fn test_hierarchy_and_assignability() {
    let (speaker, animal, bird) = animals();

    let chain: Vec<String> = reflect::hierarchy(&bird).iter().map(|t| t.full_name()).collect();
    assert_eq!(chain, vec!["Bird", "Animal"]);
    assert!(reflect::is_subclass_of(&bird, &animal));
    assert!(!reflect::is_subclass_of(&animal, &animal));
    assert!(bird.is_assignable_to(&speaker));
    assert!(!speaker.is_assignable_to(&bird));
    assert_eq!(reflect::all_interfaces(&bird), vec![speaker]);
}

#[test]
fn test_overrides_share_base_definition() {
    let (_, animal, bird) = animals();
    let base_speak = animal.method("Speak").unwrap();
    let bird_speak = bird.methods()[0].clone();

    assert_eq!(bird_speak.overridden(), Some(&base_speak));
    assert_eq!(bird_speak.base_definition(), base_speak);
    assert!(bird_speak.same_definition(&base_speak));
    assert_eq!(reflect::find_override(&bird, &base_speak), Some(bird_speak));
}

#[test]
fn test_sealed_override_leaves_overridable_set() {
    let (_, _, bird) = animals();
    let (overridable, fixed) = reflect::overridable_methods(&bird);

    let names: Vec<String> = overridable.iter().map(|m| m.qualified_name()).collect();
    assert_eq!(names, vec!["Bird.Speak()"]);
    let fixed: Vec<String> = fixed.iter().map(|m| m.qualified_name()).collect();
    assert_eq!(fixed, vec!["Bird.Legs()"]);
}

#[test]
fn test_virtual_call_runs_most_derived_body() {
    let (speaker, animal, bird) = animals();
    let sparrow = ObjectRef::new(&bird);

    let through_interface = sparrow.invoke(&speaker.methods()[0], &mut []).unwrap();
    assert_eq!(through_interface, Value::from("tweet"));
    let through_base = sparrow.invoke(&animal.method("Legs").unwrap(), &mut []).unwrap();
    assert_eq!(through_base, Value::Int(2));
}

#[test]
fn test_abstract_body_is_missing() {
    let (_, animal, _) = animals();
    let speak = animal.method("Speak").unwrap();
    let err = speak.call(&ObjectRef::new(&animal), &[], &mut []).unwrap_err();
    assert!(matches!(err, CallError::MissingImplementation { .. }));
}

// ============================================================================
// Interface Map Tests
// ============================================================================

#[test]
fn test_interface_inheritance_methods() {
    let reader = TypeBuilder::interface("IReader")
        .method(MethodBuilder::new("Read").returns(Ty::Str))
        .build()
        .unwrap();
    let stream = TypeBuilder::interface("IStream")
        .implements(&reader)
        .method(MethodBuilder::new("Close"))
        .build()
        .unwrap();

    let names: Vec<String> = reflect::interface_methods(&stream)
        .iter()
        .map(|m| m.qualified_name())
        .collect();
    assert_eq!(names, vec!["IStream.Close()", "IReader.Read()"]);
    assert!(stream.is_assignable_to(&reader));
}

#[test]
fn test_explicit_implementation_must_name_implemented_interface() {
    let iface = TypeBuilder::interface("IFoo")
        .method(MethodBuilder::new("Foo"))
        .build()
        .unwrap();
    let err = TypeBuilder::class("NotFoo")
        .explicit_impl(&iface.methods()[0], MethodBuilder::new("Foo"))
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        TypeError::ExplicitImplementationMismatch {
            ty: "NotFoo".to_string(),
            method: "IFoo.Foo()".to_string(),
        }
    );
}

#[test]
fn test_inherited_interface_implementation_found_on_base() {
    let (speaker, _, bird) = animals();
    let parrot = TypeBuilder::class("Parrot").extends(&bird).build().unwrap();
    let implementation = reflect::find_interface_implementation(&parrot, &speaker.methods()[0]);
    assert_eq!(implementation.map(|m| m.qualified_name()), Some("Bird.Speak()".to_string()));
}

// ============================================================================
// Generic Tests
// ============================================================================

#[test]
fn test_generic_signatures_and_substitution() {
    let swap = MethodBuilder::new("Swap")
        .with_generic_params(&["T"])
        .with_param(ParameterDef::new("a", Ty::by_ref(Ty::GenericParam(0))))
        .with_param(ParameterDef::new("b", Ty::by_ref(Ty::GenericParam(0))));
    let ty = TypeBuilder::class("Util")
        .method(swap.with_body(|ctx| {
            let (a, b) = (ctx.arg(0), ctx.arg(1));
            ctx.set_arg(0, b);
            ctx.set_arg(1, a);
            Ok(Value::Null)
        }))
        .build()
        .unwrap();
    let method = &ty.methods()[0];
    assert_eq!(method.signature().to_string(), "Swap<1>(ref !!0, ref !!0)");
    assert!(method.is_generic());

    let mut args = [Value::Int(1), Value::Int(2)];
    method.call(&ObjectRef::new(&ty), &[Ty::Int], &mut args).unwrap();
    assert_eq!(args, [Value::Int(2), Value::Int(1)]);

    let err = method
        .call(&ObjectRef::new(&ty), &[Ty::Int], &mut [Value::from("x"), Value::Int(2)])
        .unwrap_err();
    assert!(matches!(err, CallError::ArgumentType { index: 0, .. }));

    let err = method.call(&ObjectRef::new(&ty), &[], &mut args).unwrap_err();
    assert!(matches!(err, CallError::GenericArity { expected: 1, actual: 0, .. }));
}

// ============================================================================
// Constructor Tests
// ============================================================================

#[test]
fn test_rest_constructor_binding() {
    let ty = TypeBuilder::class("Logger")
        .constructor(
            ConstructorBuilder::new()
                .with_param(ParameterDef::new("prefix", Ty::Str))
                .with_param(ParameterDef::new("tags", Ty::array(Ty::Str)).rest()),
        )
        .build()
        .unwrap();
    let ctor = &ty.constructors()[0];

    assert!(ctor.parameters()[1].is_rest());
    assert_eq!(
        ctor.parameters()[1].attributes()[0].attribute_type,
        well_known::rest_parameters()
    );
    assert_eq!(
        ctor.bind_arguments(&[Value::from("p"), Value::from("a"), Value::from("b")]),
        Some(vec![
            Value::from("p"),
            Value::Array(vec![Value::from("a"), Value::from("b")])
        ])
    );
    assert_eq!(
        ctor.bind_arguments(&[Value::from("p")]),
        Some(vec![Value::from("p"), Value::Array(vec![])])
    );
    assert_eq!(ctor.bind_arguments(&[Value::Int(1)]), None);
}

#[test]
fn test_implicit_constructor() {
    let ty = TypeBuilder::class("Plain").build().unwrap();
    assert_eq!(ty.constructors().len(), 1);
    assert!(ty.constructors()[0].parameters().is_empty());
    assert_eq!(ty.constructors()[0].visibility(), Visibility::Public);
}

// ============================================================================
// Accessibility Tests
// ============================================================================

#[test]
fn test_nested_and_internal_accessibility() {
    let app = Arc::new(ModuleInfo::new("app").with_internals_visible_to("proxies"));
    let outer = TypeBuilder::class("Outer").in_module(&app).build().unwrap();
    let inner = TypeBuilder::interface("IInner")
        .nested_in(&outer)
        .visibility(Visibility::Internal)
        .build()
        .unwrap();
    let hidden = TypeBuilder::interface("IHidden")
        .nested_in(&outer)
        .visibility(Visibility::Private)
        .build()
        .unwrap();

    assert_eq!(inner.full_name(), "Outer+IInner");
    assert_eq!(inner.module().name(), "app");
    assert!(reflect::is_type_accessible(&inner, "proxies"));
    assert!(!reflect::is_type_accessible(&inner, "elsewhere"));
    assert!(reflect::is_type_accessible(&inner, "app"));
    assert!(!reflect::is_type_accessible(&hidden, "proxies"));
    assert!(!reflect::is_publicly_accessible(&inner));
    assert!(reflect::is_publicly_accessible(&outer));
}

// ============================================================================
// Attribute Tests
// ============================================================================

#[test]
fn test_attribute_builder_records_arguments() {
    let tag = TypeBuilder::attribute("Tag")
        .attribute_constructor(vec![Ty::Str])
        .attribute_property("Weight", Ty::Int)
        .build()
        .unwrap();
    let data = AttributeBuilder::new(&tag)
        .arg(AttributeArgument::scalar(Ty::Str, "hot"))
        .property("Weight", AttributeArgument::scalar(Ty::Int, 3))
        .build();

    assert_eq!(data.attribute_type, tag);
    assert_eq!(data.constructor_args.len(), 1);
    assert!(matches!(
        &data.constructor_args[0].value,
        AttributeValue::Scalar(Value::Str(s)) if &**s == "hot"
    ));
    assert_eq!(data.named_args[0].name, "Weight");
    assert!(!data.named_args[0].is_field);
    assert!(tag.is_sealed());
}

#[test]
fn test_attribute_data_only_on_attribute_types() {
    let err = TypeBuilder::class("NotAnAttribute")
        .attribute_constructor(vec![Ty::Int])
        .build()
        .unwrap_err();
    assert!(matches!(err, TypeError::NotAnAttribute { .. }));
}
