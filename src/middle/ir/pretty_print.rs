use colored::Colorize;
use itertools::Itertools;

use super::{Expr, ExprKind, MemoryRef, Pipeline, Stmt, StmtKind};

const INDENT_WIDTH: usize = 4;

impl core::fmt::Display for MemoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.buffer.value().blue(), self.index)
    }
}

impl core::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_expr(f, self, 0)
    }
}

/// Prints `expr`, wrapping it in parentheses when it binds looser than the
/// surrounding operator requires.
fn fmt_expr(f: &mut std::fmt::Formatter<'_>, expr: &Expr, min_precedence: u8) -> std::fmt::Result {
    match expr.kind() {
        ExprKind::IntImm(value) => write!(f, "{}", value.to_string().purple()),
        ExprKind::Variable(name) => write!(f, "{}", name.value()),
        ExprKind::Load(source) => write!(f, "{source}"),
        ExprKind::Binary { operator, lhs, rhs } => {
            let precedence = operator.precedence();
            let wrap = precedence < min_precedence;

            if wrap {
                write!(f, "(")?;
            }

            fmt_expr(f, lhs, precedence)?;
            write!(f, " {} ", operator.to_string().white())?;
            // Left associative, so an equal precedence rhs needs parentheses
            fmt_expr(f, rhs, precedence + 1)?;

            if wrap {
                write!(f, ")")?;
            }

            Ok(())
        }
        ExprKind::Let { name, value, body } => write!(
            f,
            "({} {} = {value} {} {body})",
            "let".magenta(),
            name.value(),
            "in".magenta()
        ),
        ExprKind::Call { name, arguments } => write!(
            f,
            "{}({})",
            name.value().cyan(),
            arguments.iter().map(|arg| arg.to_string()).join(", ")
        ),
    }
}

impl core::fmt::Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        StmtPrinter { f, indent: 0 }.print(self)
    }
}

impl core::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        StmtPrinter { f, indent: 0 }.print_pipeline(self)
    }
}

struct StmtPrinter<'a, 'f> {
    f: &'a mut std::fmt::Formatter<'f>,
    indent: usize,
}

impl StmtPrinter<'_, '_> {
    fn line_start(&mut self) -> std::fmt::Result {
        write!(self.f, "{:width$}", "", width = self.indent * INDENT_WIDTH)
    }

    fn print(&mut self, stmt: &Stmt) -> std::fmt::Result {
        match stmt.kind() {
            StmtKind::Sequence { .. } => {
                let mut elements = Vec::new();
                stmt.flatten_into(&mut elements);

                let Some((last, init)) = elements.split_last() else {
                    return Ok(());
                };

                // A let scopes over everything after it, so a let which is not
                // the final element gets its own braces to keep its body apart
                // from the statements that follow.
                for element in init {
                    if matches!(element.kind(), StmtKind::LetStmt { .. }) {
                        self.print_braced(None, element)?;
                    } else {
                        self.print(element)?;
                    }
                }

                self.print(last)
            }
            StmtKind::Store { destination, value } => {
                self.line_start()?;
                writeln!(self.f, "{destination} {} {value};", "=".white())
            }
            StmtKind::Free { buffer } => {
                self.line_start()?;
                writeln!(self.f, "{} {};", "free".magenta(), buffer.value().blue())
            }
            StmtKind::Pipeline(pipeline) => self.print_pipeline(pipeline),
            StmtKind::For {
                variable,
                min,
                extent,
                body,
            } => {
                let header = format!(
                    "{} {} {} {min}..{extent} ",
                    "for".magenta(),
                    variable.value(),
                    "in".magenta()
                );
                self.print_braced(Some(&header), body)
            }
            StmtKind::IfThenElse {
                condition,
                then_case,
                else_case,
            } => {
                let header = format!("{} {condition} ", "if".magenta());
                self.print_braced(Some(&header), then_case)?;

                if let Some(else_case) = else_case {
                    let header = format!("{} ", "else".magenta());
                    self.print_braced(Some(&header), else_case)?;
                }

                Ok(())
            }
            StmtKind::LetStmt { name, value, body } => {
                self.line_start()?;
                writeln!(
                    self.f,
                    "{} {} {} {value};",
                    "let".magenta(),
                    name.value(),
                    "=".white()
                )?;
                self.print(body)
            }
            StmtKind::Evaluate(value) => {
                self.line_start()?;
                writeln!(self.f, "{value};")
            }
        }
    }

    fn print_pipeline(&mut self, pipeline: &Pipeline) -> std::fmt::Result {
        self.line_start()?;
        writeln!(
            self.f,
            "{} {} {{",
            "pipeline".magenta(),
            pipeline.name.value().bright_red()
        )?;
        self.indent += 1;

        self.print_braced(Some(&format!("{} ", "produce".magenta())), &pipeline.produce)?;
        if let Some(update) = &pipeline.update {
            self.print_braced(Some(&format!("{} ", "update".magenta())), update)?;
        }
        self.print_braced(Some(&format!("{} ", "consume".magenta())), &pipeline.consume)?;

        self.indent -= 1;
        self.line_start()?;
        writeln!(self.f, "}}")
    }

    fn print_braced(&mut self, header: Option<&str>, body: &Stmt) -> std::fmt::Result {
        self.line_start()?;
        writeln!(self.f, "{}{{", header.unwrap_or_default())?;

        self.indent += 1;
        self.print(body)?;
        self.indent -= 1;

        self.line_start()?;
        writeln!(self.f, "}}")
    }
}
