//! End-to-end expansion of the fixture programs against the bundled macro
//! libraries.

mod common;

use common::{assert_same_program, expand_fixture, expand_fixture_with, fixture, plain};

use cmacro::macros::hygiene::unit_tag;
use cmacro::macros::ExpansionContext;
use cmacro::{CmacroError, Engine, ExpansionConfig};

const LAMBDA_LIB: &str = "macros/fn/lambda.c";
const LAZY_LIB: &str = "macros/fn/lazy.c";

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn toplevel_lambda_becomes_a_named_function() {
    let unit = expand_fixture("programs/lambda_toplevel.c").unwrap();
    assert_same_program(
        &plain(&unit),
        "int cmacro_lambda_0 (int x) { return x; } cmacro_lambda_0",
    );
}

#[test]
fn delay_and_force_go_through_a_hoisted_lambda() {
    let unit = expand_fixture("programs/lazy.c").unwrap();
    assert_same_program(
        &plain(&unit),
        "int compute(void) { return 42; }
         typeof((compute())) cmacro_lambda_0 () { return (compute()); }
         int main(void) {
             int (*thunk)(void) = cmacro_lambda_0;
             return (thunk)();
         }",
    );
}

#[test]
fn data_declares_a_tagged_union_and_construct_fills_it() {
    let unit = expand_fixture("programs/shapes.c").unwrap();
    assert_same_program(
        &plain(&unit),
        "typedef enum { ShapeCircle, ShapeSquare, } cmacro_data_0;
         typedef struct {
             cmacro_data_0 type;
             union {
                 struct Circle { double r; } Circle;
                 struct Square { double s; } Square;
             };
         } Shape;
         int main(void) {
             Shape s;
             s.type = ShapeCircle;
             s.Circle = (struct Circle){ 1.5 };
             return s.type == ShapeCircle;
         }",
    );
}

#[test]
fn bracketed_return_type_is_spliced_into_the_signature() {
    let engine = Engine::new(ExpansionConfig::default())
        .with_macro_files(&[fixture(LAMBDA_LIB)])
        .unwrap()
        .with_trace(true);
    let unit = engine
        .expand_source("bracketed.c", "lambda (int x) -> (int) { return x; }")
        .unwrap();
    assert_eq!(unit.trace[0].case_index, 0);
    assert_same_program(
        &plain(&unit),
        "int cmacro_lambda_0 (int x) { return x; } cmacro_lambda_0",
    );
}

#[test]
fn lambda_in_a_struct_initializer_hoists_above_the_declaration() {
    let engine = Engine::new(ExpansionConfig::default())
        .with_macro_files(&[fixture(LAMBDA_LIB)])
        .unwrap();
    let unit = engine
        .expand_source(
            "init.c",
            "struct P { int (*f)(int); } p = { lambda (int x) -> int { return x; } };\n\
             int main(void) { return p.f(1); }",
        )
        .unwrap();
    assert_same_program(
        &plain(&unit),
        "int cmacro_lambda_0 (int x) { return x; }
         struct P { int (*f)(int); } p = { cmacro_lambda_0 };
         int main(void) { return p.f(1); }",
    );
}

#[test]
fn import_cycles_are_reported_with_their_chain() {
    let err = expand_fixture("errors/cycle_main.c").unwrap_err();
    match err {
        CmacroError::ImportCycle { chain, .. } => {
            assert_eq!(chain, "cycle_a.c -> cycle_b.c -> cycle_a.c")
        }
        other => panic!("expected an import cycle, got {other:?}"),
    }
}

#[test]
fn self_recursive_template_hits_the_step_ceiling() {
    let config = ExpansionConfig {
        max_steps: 50,
        ..ExpansionConfig::default()
    };
    let err = expand_fixture_with(config, "errors/forever.c").unwrap_err();
    match err {
        CmacroError::ExpansionDepthExceeded { limit, macro_name, .. } => {
            assert_eq!(limit, 50);
            assert_eq!(macro_name, "forever");
        }
        other => panic!("expected the step ceiling, got {other:?}"),
    }
}

// ============================================================================
// LIBRARIES
// ============================================================================

#[test]
fn resource_macros_wrap_their_bodies() {
    let unit = expand_fixture("programs/resources.c").unwrap();
    assert_same_program(
        &plain(&unit),
        "#include <stdio.h>
         #include <stdlib.h>
         struct { int first; double second; } pair;
         int main(void) {
             {
                 char* buf = malloc(sizeof(char) * 64);
                 if (buf) { buf[0] = 0; }
                 free(buf);
             }
             {
                 int* n = malloc(sizeof(int) * 1);
                 if (n) { *n = 1; }
                 free(n);
             }
             {
                 FILE* out = fopen(\"out.txt\", \"w\");
                 if (out) { fputs(\"hi\", out); }
                 fclose(out);
             }
             puts(\"done\");
             return 0;
         }",
    );
}

#[test]
fn unmatched_invocation_explains_each_case() {
    let err = expand_fixture("errors/no_case.c").unwrap_err();
    let CmacroError::NoMatchingCase { macro_name, help: Some(help), .. } = err else {
        panic!("expected NoMatchingCase, got {err:?}");
    };
    assert_eq!(macro_name, "twice");
    assert!(help.starts_with("case 1:"), "{help}");
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn expanded_output_is_a_fixpoint() {
    let engine = Engine::new(ExpansionConfig::default())
        .with_macro_files(&[fixture(LAZY_LIB)])
        .unwrap();
    let source = "int main(void) { int (*t)(void) = delay (1 + 2); return force(t); }";
    let once = plain(&engine.expand_source("once.c", source).unwrap());
    let twice = engine.expand_source("twice.c", once.clone()).unwrap();
    assert_eq!(twice.steps, 0);
    assert_eq!(plain(&twice), once);
}

#[test]
fn expansion_is_deterministic() {
    let first = expand_fixture("programs/shapes.c").unwrap();
    let second = expand_fixture("programs/shapes.c").unwrap();
    assert_eq!(plain(&first), plain(&second));
    assert_eq!(first.render(true), second.render(true));
}

#[test]
fn every_invocation_gets_its_own_gensym() {
    let engine = Engine::new(ExpansionConfig::default())
        .with_macro_files(&[fixture(LAMBDA_LIB)])
        .unwrap();
    let unit = engine
        .expand_source(
            "two.c",
            "int cmacro_lambda_1;\n\
             thunk f = lambda () -> int { return 1; };\n\
             thunk g = lambda () -> int { return 2; };",
        )
        .unwrap();
    let text = plain(&unit);
    assert!(text.contains("thunk f = cmacro_lambda_0;"), "{text}");
    // `cmacro_lambda_1` is taken by the unit itself.
    assert!(text.contains("thunk g = cmacro_lambda_2;"), "{text}");
}

#[test]
fn unit_tags_keep_names_apart_across_units() {
    let config = ExpansionConfig {
        unit_tags: true,
        ..ExpansionConfig::default()
    };
    let engine = Engine::new(config)
        .with_macro_files(&[fixture(LAMBDA_LIB)])
        .unwrap();
    let source = "lambda () -> int { return 1; }";
    let a = plain(&engine.expand_source("a.c", source).unwrap());
    let b = plain(&engine.expand_source("b.c", source).unwrap());
    assert!(a.contains(&format!("cmacro_lambda_{}_0", unit_tag("a.c"))), "{a}");
    assert!(b.contains(&format!("cmacro_lambda_{}_0", unit_tag("b.c"))), "{b}");
    assert_ne!(a, b);
}

#[test]
fn tree_expansion_gives_each_file_its_own_names() {
    let dir = tempfile::tempdir().unwrap();
    let import = format!("cmacro_import \"{}\"\n", fixture(LAMBDA_LIB).display());
    let body = "int (*f)(int) = lambda (int x) -> int { return x; };";
    std::fs::write(dir.path().join("a.c"), format!("{import}{body}")).unwrap();
    std::fs::write(dir.path().join("b.c"), format!("{import}{body}")).unwrap();
    let results = Engine::new(ExpansionConfig::default())
        .expand_tree(dir.path())
        .unwrap();
    let texts: Vec<String> = results
        .iter()
        .map(|(path, result)| {
            let text = plain(result.as_ref().unwrap());
            let tag = unit_tag(&path.display().to_string());
            assert!(text.contains(&format!("cmacro_lambda_{tag}_0")), "{text}");
            text
        })
        .collect();
    assert_eq!(texts.len(), 2);
    assert_ne!(texts[0], texts[1]);
}

#[test]
fn trace_records_context_and_hoisting() {
    let engine = Engine::new(ExpansionConfig::default()).with_trace(true);
    let unit = engine.expand_file(&fixture("programs/lazy.c")).unwrap();
    let names: Vec<&str> = unit.trace.iter().map(|s| s.macro_name.as_str()).collect();
    assert_eq!(names, ["delay", "lambda", "force"]);
    assert!(unit.trace.iter().all(|s| s.context == ExpansionContext::Nested));
    assert!(unit.trace[0].hoisted.is_none());
    assert!(unit.trace[1].hoisted.as_deref().unwrap().contains("cmacro_lambda_0"));
    assert_eq!(unit.trace.last().unwrap().snapshot, plain(&unit));

    let toplevel = engine
        .expand_file(&fixture("programs/lambda_toplevel.c"))
        .unwrap();
    assert_eq!(toplevel.trace[0].context, ExpansionContext::Toplevel);
}

// ============================================================================
// LAYOUT
// ============================================================================

#[test]
fn untouched_source_prints_byte_for_byte() {
    let path = fixture("programs/plain.c");
    let unit = Engine::new(ExpansionConfig::default())
        .expand_file(&path)
        .unwrap();
    assert_eq!(unit.steps, 0);
    assert_eq!(unit.render(true), std::fs::read_to_string(&path).unwrap());
}

#[test]
fn faithful_rendering_keeps_comments_around_expansions() {
    let unit = expand_fixture("programs/resources.c").unwrap();
    let text = unit.render(true);
    assert!(text.starts_with("#include <stdio.h>\n#include <stdlib.h>\n"), "{text}");
    assert!(text.contains("puts(\"done\"); // finished\n    return 0;\n}"), "{text}");
}

#[test]
fn tree_expansion_covers_every_program() {
    let engine = Engine::new(ExpansionConfig::default());
    let results = engine.expand_tree(&fixture("programs")).unwrap();
    let names: Vec<String> = results
        .iter()
        .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        ["lambda_toplevel.c", "lazy.c", "plain.c", "resources.c", "shapes.c"]
    );
    for (path, result) in &results {
        assert!(result.is_ok(), "{} failed: {:?}", path.display(), result);
    }
}
