use arrayc::{
    frontend::{SourceFile, SourceFileOrigin, parser::Parser},
    middle::{
        ir::Stmt,
        optimization::{
            reorder_stores::{ReorderOptions, alias::StructuralAlias, reorder_stores},
            verify::verify_reorder_stores,
        },
    },
};
use indoc::indoc;

fn parse(contents: &str) -> Stmt {
    Parser::parse_program(&SourceFile::new(contents, SourceFileOrigin::Memory))
        .expect("test program should parse")
}

fn print(stmt: &Stmt) -> String {
    strip_ansi_escapes::strip_str(stmt.to_string())
}

fn reorder(contents: &str, options: &ReorderOptions) -> String {
    print(&reorder_stores(&parse(contents), options))
}

fn all_options() -> Vec<ReorderOptions> {
    let mut options = Vec::new();

    for forward_through_lets in [false, true] {
        for strict_hazards in [false, true] {
            for free_barriers in [false, true] {
                options.push(ReorderOptions {
                    forward_through_lets,
                    strict_hazards,
                    free_barriers,
                });
            }
        }
    }

    options
}

const PROGRAMS: &[&str] = &[
    indoc! {"
        pipeline f {
            produce {
                a[0] = b[0];
                x[0] = 3;
                c[0] = a[0];
            }
            consume { out[0] = c[0] + x[0]; }
        }
    "},
    indoc! {"
        pipeline f {
            produce {
                a[0] = 1;
                free a;
                b[0] = a[0];
            }
            consume { out[0] = b[0]; }
        }
    "},
    indoc! {"
        pipeline blur {
            produce {
                for x in 0..16 { tmp[x] = input[x] + input[x + 1]; }
            }
            update {
                for x in 0..16 { tmp[x] = tmp[x] / 2; }
            }
            consume {
                let t = tmp[0];
                out[0] = t;
                for x in 1..16 { out[x] = tmp[x]; }
                free tmp;
            }
        }
    "},
    indoc! {"
        for y in 0..4 {
            pipeline inner {
                produce {
                    a[y] = b[y] * 2;
                    s[0] = 0;
                    c[y] = a[y];
                    if y > 0 { s[0] = s[0] + c[y]; }
                }
                consume { d[y] = c[y]; }
            }
        }
    "},
    indoc! {"
        pipeline outer {
            produce {
                pipeline g {
                    produce { g[0] = h[0]; }
                    consume { k[0] = g[0]; }
                }
                m[0] = 1;
                n[0] = k[0] + m[0];
            }
            consume {
                free g;
                r[0] = n[0];
            }
        }
    "},
];

#[test]
fn forwards_a_store_of_a_load() {
    let result = reorder(
        indoc! {"
            pipeline f {
                produce { a[0] = b[0]; }
                consume { c[0] = a[0]; }
            }
        "},
        &ReorderOptions::default(),
    );

    assert_eq!(
        result,
        indoc! {"
            a[0] = b[0];
            c[0] = b[0];
        "}
    );
}

#[test]
fn independent_stores_keep_their_order() {
    let result = reorder(
        indoc! {"
            pipeline f {
                produce { a[0] = 5; }
                consume { b[0] = 7; }
            }
        "},
        &ReorderOptions::default(),
    );

    assert_eq!(
        result,
        indoc! {"
            a[0] = 5;
            b[0] = 7;
        "}
    );
}

#[test]
fn readers_never_pass_a_later_store_to_the_same_location() {
    let result = reorder(
        indoc! {"
            pipeline f {
                produce { a[0] = 1; }
                update { a[0] = 2; }
                consume { b[0] = a[0]; }
            }
        "},
        &ReorderOptions::default(),
    );

    // `b[0] = a[0]` reads what both stores write, so it stays behind the
    // second one and only gets that store's value.
    assert_eq!(
        result,
        indoc! {"
            a[0] = 1;
            a[0] = 2;
            b[0] = 2;
        "}
    );
}

#[test]
fn reader_moves_up_without_crossing_the_restore() {
    let result = reorder(
        indoc! {"
            pipeline f {
                produce {
                    a[0] = 1;
                    b[0] = a[0];
                    a[0] = 2;
                }
                consume { }
            }
        "},
        &ReorderOptions::default(),
    );

    assert_eq!(
        result,
        indoc! {"
            a[0] = 1;
            b[0] = 1;
            a[0] = 2;
            0;
        "}
    );
}

#[test]
fn loads_under_a_rebinding_loop_are_not_forwarded() {
    let result = reorder(
        indoc! {"
            pipeline f {
                produce { a[x] = 5; }
                consume {
                    if 1 {
                        c[0] = a[x];
                        for x in 0..4 { d[x] = a[x]; }
                    }
                }
            }
        "},
        &ReorderOptions::default(),
    );

    assert_eq!(
        result,
        indoc! {"
            a[x] = 5;
            if 1 {
                c[0] = a[x];
                for x in 0..4 {
                    d[x] = a[x];
                }
            }
        "}
    );
}

#[test]
fn verification_rejects_a_misordered_output() {
    let input = parse(indoc! {"
        pipeline f {
            produce { a[0] = 1; }
            consume { c[0] = a[0]; }
        }
    "});
    let swapped = parse(indoc! {"
        c[0] = a[0];
        a[0] = 1;
    "});

    let options = ReorderOptions::default();

    assert!(verify_reorder_stores(&input, &swapped, &options, &StructuralAlias).is_err());
}

#[test]
fn frees_do_not_take_part_in_scheduling() {
    let program = indoc! {"
        pipeline f {
            produce {
                a[0] = 1;
                free a;
                b[0] = a[0];
            }
            consume { out[0] = b[0]; }
        }
    "};

    assert_eq!(
        reorder(program, &ReorderOptions::default()),
        indoc! {"
            a[0] = 1;
            b[0] = 1;
            free a;
            out[0] = b[0];
        "}
    );

    let barriers = ReorderOptions {
        free_barriers: true,
        ..Default::default()
    };
    assert_eq!(
        reorder(program, &barriers),
        indoc! {"
            a[0] = 1;
            free a;
            b[0] = a[0];
            out[0] = a[0];
        "}
    );
}

#[test]
fn regions_inside_loops_are_rescheduled_in_place() {
    let result = reorder(PROGRAMS[3], &ReorderOptions::default());

    assert_eq!(
        result,
        indoc! {"
            for y in 0..4 {
                a[y] = b[y] * 2;
                c[y] = b[y] * 2;
                s[0] = 0;
                if y > 0 {
                    s[0] = s[0] + c[y];
                }
                d[y] = c[y];
            }
        "}
    );
}

#[test]
fn statements_outside_regions_are_untouched() {
    let program = parse(indoc! {"
        a[0] = b[0];
        c[0] = a[0];
    "});

    let result = reorder_stores(&program, &ReorderOptions::default());

    assert!(result.same_node(&program));
}

#[test]
fn output_is_a_legal_reordering() {
    for options in all_options() {
        for source in PROGRAMS {
            let input = parse(source);
            let output = reorder_stores(&input, &options);

            if let Err(error) = verify_reorder_stores(&input, &output, &options, &StructuralAlias) {
                panic!("{options:?} broke\n{source}\n{}: {error}", print(&output));
            }
        }
    }
}

#[test]
fn reordering_is_deterministic() {
    for options in all_options() {
        for source in PROGRAMS {
            let first = reorder_stores(&parse(source), &options);
            let second = reorder_stores(&parse(source), &options);

            assert_eq!(first, second);
            assert_eq!(print(&first), print(&second));
        }
    }
}

#[test]
fn repeated_application_stays_legal() {
    let options = ReorderOptions::default();

    for source in PROGRAMS {
        // Regions are gone after one run, so wrap the result in a fresh one
        let once = reorder_stores(&parse(source), &options);
        let wrapped = Stmt::pipeline("again", once, None, Stmt::no_op());
        let twice = reorder_stores(&wrapped, &options);

        assert_eq!(
            verify_reorder_stores(&wrapped, &twice, &options, &StructuralAlias),
            Ok(())
        );
    }
}
