/*!
# Rewrite Engine Integration Tests

Each test builds a module of synthetic methods that call legacy members,
runs the engine, and inspects the rewritten bodies and the report.
*/

mod common;

use common::*;
use pretty_assertions::assert_eq;

use nnyeah_core::module::{
    verify_module, ExceptionHandler, HandlerKind, Instruction, MemberRef, MethodBody, MethodDef, OpCode, Operand,
    TypeDef, TypeRef, TypeSig,
};
use nnyeah_core::transforms::{Action, CatalogueBuilder, Emit};
use nnyeah_core::{apply, DiagnosticCode, RewriteOptions, Rewriter, Severity};

#[test]
fn every_replacement_splices_its_sequence() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));

    let mut edit = app_module();
    let mut cases = Vec::new();
    for (i, (signature, action)) in catalogue.iter().enumerate() {
        let Action::Replace(sequence) = action else {
            continue;
        };
        let member = legacy_member(signature);
        let name = format!("case{i}");
        let synthetic = add_call_method(&mut edit, &name, &member, invocation_opcode(&member));
        cases.push((name, signature.clone(), sequence.clone(), synthetic));
    }
    assert!(cases.len() > 100, "only {} replacements", cases.len());

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);
    assert_eq!(report.replaced, cases.len() as u64);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

    let module = ctx.module();
    for (name, signature, sequence, synthetic) in &cases {
        let mut expected = synthetic.prologue.clone();
        expected.extend(expected_lowering(module, sequence));
        expected.extend(synthetic.epilogue.iter().cloned());
        assert_eq!(body_of(module, name).instructions, expected, "{signature}");
    }
    verify_module(module)?;
    Ok(())
}

#[test]
fn pass_through_leaves_the_call() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    let mut edit = app_module();
    let member = legacy_member_text("System.Void System.nint::.cctor()");
    let synthetic = add_call_method(&mut edit, "init", &member, OpCode::Call);

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);

    assert_eq!(report.passed_through, 1);
    assert_eq!(report.methods_changed, 0);
    assert_eq!(body_of(ctx.module(), "init").instructions, synthetic.instructions());
    Ok(())
}

#[test]
fn each_diagnostic_entry_reports_once() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    for (signature, action) in catalogue.iter() {
        let Action::Diagnostic(code) = action else {
            continue;
        };
        let mut edit = app_module();
        let member = legacy_member(signature);
        let synthetic = add_call_method(&mut edit, "site", &member, invocation_opcode(&member));

        let mut ctx = context(edit);
        let report = apply(&mut ctx, &catalogue);

        assert_eq!(report.diagnostics.len(), 1, "{signature}");
        let diagnostic = &report.diagnostics[0];
        assert_eq!(diagnostic.code, *code);
        assert_eq!(diagnostic.signature, signature.canonical());
        assert_eq!(diagnostic.method, "App.Calls::site");
        assert_eq!(diagnostic.instruction, synthetic.prologue.len());
        assert_eq!(body_of(ctx.module(), "site").instructions, synthetic.instructions());
        verify_module(ctx.module())?;
    }
    Ok(())
}

#[test]
fn module_without_legacy_calls_is_unchanged() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    let mut edit = app_module();
    let hash = MemberRef::instance(
        TypeRef::new(CORE, "System", "Object"),
        "GetHashCode",
        TypeSig::named(CORE, "System", "Int32"),
    );
    add_call_method(&mut edit, "plain", &hash, OpCode::Callvirt);
    let before = serde_json::to_string(&edit)?;

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);

    assert_eq!(report.methods_scanned, 1);
    assert_eq!(report.replaced + report.passed_through + report.diagnosed, 0);
    assert_eq!(serde_json::to_string(ctx.module())?, before);
    Ok(())
}

#[test]
fn compare_to_calls_the_successor_with_tagged_parameter() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    let mut edit = app_module();
    let member = legacy_member_text("System.Int32 System.nint::CompareTo(System.nint)");
    add_call_method(&mut edit, "compare", &member, OpCode::Call);

    let mut ctx = context(edit);
    apply(&mut ctx, &catalogue);

    let module = ctx.module();
    let body = body_of(module, "compare");
    assert_eq!(body.instructions.len(), 5);
    let call = &body.instructions[2];
    assert_eq!(call.opcode, OpCode::Call);
    let target = module.member(call.member().unwrap()).unwrap();
    assert_eq!(target.declaring_type.full_name(), "System.IntPtr");
    assert_eq!(target.declaring_type.scope, SUCCESSOR);
    assert!(target.has_this);
    assert_eq!(target.parameters.len(), 1);
    assert_eq!(
        target.parameters[0].attributes[0].attribute_type.full_name(),
        "System.Runtime.CompilerServices.NativeIntegerAttribute"
    );
    assert!(module.assembly_refs.contains(SUCCESSOR));
    Ok(())
}

#[test]
fn unsigned_array_copy_is_an_error_without_changes() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    let mut edit = app_module();
    let member =
        legacy_member_text("System.Void System.nuint::CopyArray(System.IntPtr,System.nuint[],System.Int32,System.Int32)");
    let synthetic = add_call_method(&mut edit, "copy", &member, OpCode::Call);

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);

    assert_eq!(body_of(ctx.module(), "copy").instructions, synthetic.instructions());
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].code, DiagnosticCode::UnsupportedArrayCopy);
    assert_eq!(report.diagnostics[0].severity, Severity::Error);
    assert!(report.has_errors());
    Ok(())
}

#[test]
fn constructor_on_address_stores_the_result() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    let mut edit = app_module();
    let ctor = legacy_member_text("System.Void System.nint::.ctor(System.Int32)");
    let token = edit.import_member(&ctor);
    edit.types.push(TypeDef {
        namespace: "App".to_string(),
        name: "Calls".to_string(),
        methods: vec![MethodDef {
            name: "init".to_string(),
            is_static: true,
            return_type: TypeSig::named(CORE, "System", "Void"),
            parameters: Vec::new(),
            body: Some(MethodBody {
                max_stack: 2,
                locals: vec![type_named("System.nint")],
                instructions: vec![
                    Instruction::with(OpCode::Ldloca, Operand::Local(0)),
                    Instruction::new(OpCode::LdcI4_5),
                    Instruction::with(OpCode::Call, Operand::Member(token)),
                    Instruction::new(OpCode::Ret),
                ],
                handlers: Vec::new(),
            }),
        }],
    });

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);
    assert_eq!(report.replaced, 1);

    let module = ctx.module();
    let int_ptr = TypeSig::named(SUCCESSOR, "System", "IntPtr");
    let body = body_of(module, "init");
    assert_eq!(
        body.instructions,
        vec![
            Instruction::with(OpCode::Ldloca, Operand::Local(0)),
            Instruction::new(OpCode::LdcI4_5),
            Instruction::new(OpCode::ConvI),
            Instruction::with(OpCode::Stobj, Operand::Type(module.type_token(&int_ptr).unwrap())),
            Instruction::new(OpCode::Ret),
        ]
    );
    assert_eq!(body.max_stack, 2);
    Ok(())
}

#[test]
fn branches_and_handlers_follow_spliced_code() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    let mut edit = app_module();
    let inequality = legacy_member_text("System.Boolean System.nint::op_Inequality(System.nint,System.nint)");
    let token = edit.import_member(&inequality);

    // 0: ldarg.0  1: ldarg.1  2: call op_Inequality  3: brtrue 6
    // 4: ldc.i4.0 5: pop      6: leave 8              7: endfinally  8: ret
    let body = MethodBody {
        max_stack: 2,
        locals: Vec::new(),
        instructions: vec![
            Instruction::with(OpCode::Ldarg, Operand::Argument(0)),
            Instruction::with(OpCode::Ldarg, Operand::Argument(1)),
            Instruction::with(OpCode::Call, Operand::Member(token)),
            Instruction::with(OpCode::Brtrue, Operand::Target(6)),
            Instruction::new(OpCode::LdcI4_0),
            Instruction::new(OpCode::Pop),
            Instruction::with(OpCode::Leave, Operand::Target(8)),
            Instruction::new(OpCode::Endfinally),
            Instruction::new(OpCode::Ret),
        ],
        handlers: vec![ExceptionHandler {
            kind: HandlerKind::Finally,
            try_start: 0,
            try_end: 7,
            handler_start: 7,
            handler_end: 8,
            catch_type: None,
        }],
    };
    edit.types.push(TypeDef {
        namespace: "App".to_string(),
        name: "Calls".to_string(),
        methods: vec![MethodDef {
            name: "branchy".to_string(),
            is_static: true,
            return_type: TypeSig::named(CORE, "System", "Void"),
            parameters: vec![type_named("System.nint"), type_named("System.nint")],
            body: Some(body),
        }],
    });

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);
    assert_eq!(report.methods_changed, 1);

    let body = body_of(ctx.module(), "branchy");
    assert_eq!(body.instructions.len(), 11);
    assert_eq!(body.instructions[2].opcode, OpCode::Ceq);
    assert_eq!(body.instructions[3].opcode, OpCode::LdcI4_0);
    assert_eq!(body.instructions[4].opcode, OpCode::Ceq);
    assert_eq!(body.instructions[5].operand, Operand::Target(8));
    assert_eq!(body.instructions[8].operand, Operand::Target(10));
    let handler = &body.handlers[0];
    assert_eq!((handler.try_end, handler.handler_start, handler.handler_end), (9, 9, 10));
    verify_module(ctx.module())?;
    Ok(())
}

#[test]
fn unknown_legacy_member_warns_and_is_left_alone() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    let mut edit = app_module();
    let member = legacy_member_text("System.nint System.nint::op_Frobnicate(System.nint)");
    let synthetic = add_call_method(&mut edit, "odd", &member, OpCode::Call);

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);

    assert_eq!(body_of(ctx.module(), "odd").instructions, synthetic.instructions());
    let warnings = report.with_code(DiagnosticCode::UnknownLegacyMember);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].severity, Severity::Warning);
    assert!(report.success());
    Ok(())
}

#[test]
fn severity_overrides_apply_to_recorded_diagnostics() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    let mut edit = app_module();
    let member = legacy_member_text("System.nint System.nint::op_Frobnicate(System.nint)");
    add_call_method(&mut edit, "odd", &member, OpCode::Call);

    let mut ctx = context(edit);
    let report = Rewriter::new(&catalogue)
        .options(RewriteOptions::new().with_severity(DiagnosticCode::UnknownLegacyMember, Severity::Error))
        .apply(&mut ctx);

    assert!(report.has_errors());
    Ok(())
}

#[test]
fn replacement_with_wrong_stack_shape_is_refused() -> anyhow::Result<()> {
    let mut builder = CatalogueBuilder::new();
    builder.insert(
        "System.nint System.nint::op_Addition(System.nint,System.nint)",
        Action::Replace(vec![Emit::op(OpCode::Add), Emit::op(OpCode::Add)]),
    )?;
    let catalogue = builder.finish();

    let mut edit = app_module();
    let member = legacy_member_text("System.nint System.nint::op_Addition(System.nint,System.nint)");
    let synthetic = add_call_method(&mut edit, "add", &member, OpCode::Call);

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);

    assert_eq!(report.replaced, 0);
    assert_eq!(report.with_code(DiagnosticCode::StackMismatch).len(), 1);
    assert_eq!(body_of(ctx.module(), "add").instructions, synthetic.instructions());
    Ok(())
}

#[test]
fn invalid_rewritten_body_is_restored() -> anyhow::Result<()> {
    let mut builder = CatalogueBuilder::new();
    // ldarg with a literal operand passes the stack check but not verification
    builder.insert(
        "System.nint System.nint::op_UnaryNegation(System.nint)",
        Action::Replace(vec![Emit::int(OpCode::Ldarg, 0), Emit::op(OpCode::Add)]),
    )?;
    let catalogue = builder.finish();

    let mut edit = app_module();
    let member = legacy_member_text("System.nint System.nint::op_UnaryNegation(System.nint)");
    let synthetic = add_call_method(&mut edit, "negate", &member, OpCode::Call);

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);

    assert_eq!(body_of(ctx.module(), "negate").instructions, synthetic.instructions());
    assert_eq!(report.replaced, 0);
    assert_eq!(report.methods_changed, 0);
    let invalid = report.with_code(DiagnosticCode::InvalidMethodBody);
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].instruction, 1);
    assert_eq!(report.diagnosed, report.diagnostics.len() as u64);
    assert_eq!(report.signatures[&invalid[0].signature].diagnosed, 1);
    assert!(report.has_errors());
    Ok(())
}

#[test]
fn type_code_temporaries_are_shared_within_a_method() -> anyhow::Result<()> {
    let catalogue = build_catalogue(&context(app_module()));
    let mut edit = app_module();
    let member = legacy_member_text("System.TypeCode System.nint::GetTypeCode()");
    let token = edit.import_member(&member);
    let call = Instruction::with(OpCode::Call, Operand::Member(token));
    edit.types.push(TypeDef {
        namespace: "App".to_string(),
        name: "Calls".to_string(),
        methods: vec![MethodDef {
            name: "twice".to_string(),
            is_static: true,
            return_type: TypeSig::named(CORE, "System", "Void"),
            parameters: vec![type_named("System.nint").by_ref()],
            body: Some(MethodBody::new(vec![
                Instruction::with(OpCode::Ldarg, Operand::Argument(0)),
                call.clone(),
                Instruction::new(OpCode::Pop),
                Instruction::with(OpCode::Ldarg, Operand::Argument(0)),
                call,
                Instruction::new(OpCode::Pop),
                Instruction::new(OpCode::Ret),
            ])),
        }],
    });

    let mut ctx = context(edit);
    let report = apply(&mut ctx, &catalogue);
    assert_eq!(report.replaced, 2);
    assert_eq!(report.signatures["System.TypeCode System.nint::GetTypeCode()"].replaced, 2);

    let body = body_of(ctx.module(), "twice");
    assert_eq!(body.locals, vec![TypeSig::named(SUCCESSOR, "System", "Int64")]);
    assert_eq!(body.instructions.len(), 15);
    assert_eq!(body.max_stack, 1);
    Ok(())
}
