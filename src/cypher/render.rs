//! Renders the clause IR to Cypher text.
//!
//! Nested `CALL {}` bodies are indented four spaces per level. And/Or
//! groups are parenthesised except at the top of a `WHERE`.

use std::fmt::Write as _;

use super::clause::{
    Clause, Imports, NodePattern, Pattern, PatternDirection, Projection, RelPattern, SetItem,
};
use super::expr::{Expr, MapEntry, Subquery, Var};
use crate::schema::SortDirection;

const INDENT: &str = "    ";

/// Renders a full clause list.
pub fn render(clauses: &[Clause]) -> String {
    let mut renderer = Renderer::default();
    renderer.clauses(clauses);
    renderer.finish()
}

/// Renders a single expression, as it would appear at the top of a `WHERE`.
pub fn render_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, false);
    out
}

#[derive(Default)]
struct Renderer {
    out: String,
    depth: usize,
}

impl Renderer {
    fn finish(mut self) -> String {
        while self.out.ends_with('\n') {
            self.out.pop();
        }
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn clauses(&mut self, clauses: &[Clause]) {
        for clause in clauses {
            self.clause(clause);
        }
    }

    fn imports(&mut self, imports: &Imports) {
        match imports {
            Imports::None => {}
            Imports::Star => self.line("WITH *"),
            Imports::Vars(vars) => {
                let names: Vec<String> = vars.iter().map(ident_of).collect();
                self.line(&format!("WITH {}", names.join(", ")));
            }
        }
    }

    fn where_line(&mut self, predicate: &Option<Expr>) {
        if let Some(predicate) = predicate {
            self.line(&format!("WHERE {}", render_expr(predicate)));
        }
    }

    fn projection(&mut self, keyword: &str, projection: &Projection) {
        let mut head = String::from(keyword);
        head.push(' ');
        if projection.distinct {
            head.push_str("DISTINCT ");
        }
        let mut items = Vec::with_capacity(projection.items.len() + 1);
        if projection.star {
            items.push("*".to_owned());
        }
        for item in &projection.items {
            let mut text = String::new();
            write_expr(&mut text, &item.expr, false);
            if let Some(alias) = &item.alias {
                let _ = write!(text, " AS {}", ident_of(alias));
            }
            items.push(text);
        }
        head.push_str(&items.join(", "));
        self.line(&head);
        if !projection.order.is_empty() {
            let keys: Vec<String> = projection
                .order
                .iter()
                .map(|item| {
                    let mut text = String::new();
                    write_expr(&mut text, &item.expr, true);
                    text.push_str(match item.direction {
                        SortDirection::Asc => " ASC",
                        SortDirection::Desc => " DESC",
                    });
                    text
                })
                .collect();
            self.line(&format!("ORDER BY {}", keys.join(", ")));
        }
        if let Some(skip) = &projection.skip {
            self.line(&format!("SKIP {}", render_expr(skip)));
        }
        if let Some(limit) = &projection.limit {
            self.line(&format!("LIMIT {}", render_expr(limit)));
        }
    }

    fn clause(&mut self, clause: &Clause) {
        match clause {
            Clause::Match {
                optional,
                patterns,
                predicate,
            } => {
                let rendered: Vec<String> = patterns.iter().map(pattern_text).collect();
                let keyword = if *optional { "OPTIONAL MATCH" } else { "MATCH" };
                self.line(&format!("{keyword} {}", rendered.join(", ")));
                self.where_line(predicate);
            }
            Clause::With {
                projection,
                predicate,
            } => {
                self.projection("WITH", projection);
                self.where_line(predicate);
            }
            Clause::Unwind { list, var } => {
                self.line(&format!("UNWIND {} AS {}", render_expr(list), ident_of(var)));
            }
            Clause::Call { imports, body } => {
                self.line("CALL {");
                self.depth += 1;
                self.imports(imports);
                self.clauses(body);
                self.depth -= 1;
                self.line("}");
            }
            Clause::Union { imports, branches } => {
                self.line("CALL {");
                self.depth += 1;
                for (idx, branch) in branches.iter().enumerate() {
                    if idx > 0 {
                        self.line("UNION");
                    }
                    self.imports(imports);
                    self.clauses(branch);
                }
                self.depth -= 1;
                self.line("}");
            }
            Clause::Create { patterns } => {
                let rendered: Vec<String> = patterns.iter().map(pattern_text).collect();
                self.line(&format!("CREATE {}", rendered.join(", ")));
            }
            Clause::Merge {
                pattern,
                on_create,
                on_match,
            } => {
                self.line(&format!("MERGE {}", pattern_text(pattern)));
                if !on_create.is_empty() {
                    self.line(&format!("ON CREATE SET {}", set_items(on_create)));
                }
                if !on_match.is_empty() {
                    self.line(&format!("ON MATCH SET {}", set_items(on_match)));
                }
            }
            Clause::Set(items) => {
                if !items.is_empty() {
                    self.line(&format!("SET {}", set_items(items)));
                }
            }
            Clause::Delete { detach, targets } => {
                let rendered: Vec<String> = targets.iter().map(render_expr).collect();
                let keyword = if *detach { "DETACH DELETE" } else { "DELETE" };
                self.line(&format!("{keyword} {}", rendered.join(", ")));
            }
            Clause::Return(projection) => self.projection("RETURN", projection),
            Clause::Raw(text) => {
                for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    self.line(line);
                }
            }
        }
    }
}

fn set_items(items: &[SetItem]) -> String {
    items
        .iter()
        .map(|item| match item {
            SetItem::Property {
                var,
                property,
                value,
            } => format!("{}.{} = {}", ident_of(var), ident(property), render_expr(value)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_simple_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Escapes an identifier with backticks when it is not a plain name.
pub fn ident(name: &str) -> String {
    if is_simple_identifier(name) {
        name.to_owned()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn ident_of(var: &Var) -> String {
    ident(var.name())
}

fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn labels_text(labels: &[String]) -> String {
    labels.iter().map(|l| format!(":{}", ident(l))).collect()
}

fn inline_properties(properties: &[(String, Expr)]) -> String {
    if properties.is_empty() {
        return String::new();
    }
    let entries: Vec<String> = properties
        .iter()
        .map(|(key, value)| format!("{}: {}", ident(key), render_expr(value)))
        .collect();
    format!(" {{ {} }}", entries.join(", "))
}

fn node_text(node: &NodePattern) -> String {
    let var = node.var.as_ref().map(ident_of).unwrap_or_default();
    format!(
        "({var}{}{})",
        labels_text(&node.labels),
        inline_properties(&node.properties)
    )
}

fn rel_text(rel: &RelPattern) -> String {
    let var = rel.var.as_ref().map(ident_of).unwrap_or_default();
    let body = format!(
        "[{var}:{}{}]",
        ident(&rel.rel_type),
        inline_properties(&rel.properties)
    );
    match rel.direction {
        PatternDirection::Right => format!("-{body}->"),
        PatternDirection::Left => format!("<-{body}-"),
        PatternDirection::Both => format!("-{body}-"),
    }
}

fn pattern_text(pattern: &Pattern) -> String {
    let mut out = node_text(&pattern.start);
    for (rel, node) in &pattern.hops {
        out.push_str(&rel_text(rel));
        out.push_str(&node_text(node));
    }
    out
}

fn subquery_text(subquery: &Subquery) -> String {
    match &subquery.predicate {
        Some(predicate) => format!(
            "MATCH {} WHERE {}",
            pattern_text(&subquery.pattern),
            render_expr(predicate)
        ),
        None => format!("MATCH {}", pattern_text(&subquery.pattern)),
    }
}

fn join_exprs(out: &mut String, exprs: &[Expr], separator: &str, nested: bool) {
    for (idx, expr) in exprs.iter().enumerate() {
        if idx > 0 {
            out.push_str(separator);
        }
        write_expr(out, expr, nested);
    }
}

fn write_expr(out: &mut String, expr: &Expr, nested: bool) {
    match expr {
        Expr::Bool(true) => out.push_str("true"),
        Expr::Bool(false) => out.push_str("false"),
        Expr::Null => out.push_str("NULL"),
        Expr::Int(value) => {
            let _ = write!(out, "{value}");
        }
        Expr::Str(text) => out.push_str(&string_literal(text)),
        Expr::Var(var) => out.push_str(&ident_of(var)),
        Expr::Param(name) => {
            out.push('$');
            out.push_str(&ident(name));
        }
        Expr::Property(base, property) => {
            write_expr(out, base, true);
            out.push('.');
            out.push_str(&ident(property));
        }
        Expr::Compare(left, op, right) => {
            write_expr(out, left, true);
            let _ = write!(out, " {} ", op.symbol());
            write_expr(out, right, true);
        }
        Expr::Arith(left, op, right) => {
            let wrap = nested;
            if wrap {
                out.push('(');
            }
            write_expr(out, left, true);
            let _ = write!(out, " {} ", op.symbol());
            write_expr(out, right, true);
            if wrap {
                out.push(')');
            }
        }
        Expr::And(parts) | Expr::Or(parts) => {
            let separator = if matches!(expr, Expr::And(_)) {
                " AND "
            } else {
                " OR "
            };
            if nested {
                out.push('(');
            }
            join_exprs(out, parts, separator, true);
            if nested {
                out.push(')');
            }
        }
        Expr::Not(inner) => {
            out.push_str("NOT (");
            write_expr(out, inner, false);
            out.push(')');
        }
        Expr::IsNull(inner) => {
            write_expr(out, inner, true);
            out.push_str(" IS NULL");
        }
        Expr::IsNotNull(inner) => {
            write_expr(out, inner, true);
            out.push_str(" IS NOT NULL");
        }
        Expr::HasLabels(var, labels) => {
            out.push_str(&ident_of(var));
            out.push_str(&labels_text(labels));
        }
        Expr::Call {
            name,
            distinct,
            args,
        } => {
            out.push_str(name);
            out.push('(');
            if *distinct {
                out.push_str("DISTINCT ");
            }
            join_exprs(out, args, ", ", false);
            out.push(')');
        }
        Expr::CountStar => out.push_str("count(*)"),
        Expr::Exists(subquery) => {
            let _ = write!(out, "EXISTS {{ {} }}", subquery_text(subquery));
        }
        Expr::Count(subquery) => {
            let _ = write!(out, "COUNT {{ {} }}", subquery_text(subquery));
        }
        Expr::List(items) => {
            out.push('[');
            join_exprs(out, items, ", ", false);
            out.push(']');
        }
        Expr::Map(entries) => {
            if entries.is_empty() {
                out.push_str("{ }");
                return;
            }
            out.push_str("{ ");
            for (idx, (key, value)) in entries.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                out.push_str(&ident(key));
                out.push_str(": ");
                write_expr(out, value, false);
            }
            out.push_str(" }");
        }
        Expr::Projection(var, entries) => {
            out.push_str(&ident_of(var));
            if entries.is_empty() {
                out.push_str(" { }");
                return;
            }
            out.push_str(" { ");
            for (idx, entry) in entries.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                match entry {
                    MapEntry::Property(name) => {
                        out.push('.');
                        out.push_str(&ident(name));
                    }
                    MapEntry::Entry(key, value) => {
                        out.push_str(&ident(key));
                        out.push_str(": ");
                        write_expr(out, value, false);
                    }
                }
            }
            out.push_str(" }");
        }
        Expr::Index(list, index) => {
            write_expr(out, list, true);
            out.push('[');
            write_expr(out, index, false);
            out.push(']');
        }
        Expr::Case {
            branches,
            otherwise,
        } => {
            out.push_str("CASE");
            for (condition, value) in branches {
                out.push_str(" WHEN ");
                write_expr(out, condition, false);
                out.push_str(" THEN ");
                write_expr(out, value, false);
            }
            if let Some(otherwise) = otherwise {
                out.push_str(" ELSE ");
                write_expr(out, otherwise, false);
            }
            out.push_str(" END");
        }
        Expr::Comprehension {
            var,
            list,
            predicate,
            map,
        } => {
            let _ = write!(out, "[{} IN ", ident_of(var));
            write_expr(out, list, true);
            if let Some(predicate) = predicate {
                out.push_str(" WHERE ");
                write_expr(out, predicate, false);
            }
            if let Some(map) = map {
                out.push_str(" | ");
                write_expr(out, map, false);
            }
            out.push(']');
        }
        Expr::Reduce {
            acc,
            init,
            var,
            list,
            body,
        } => {
            let _ = write!(out, "reduce({} = ", ident_of(acc));
            write_expr(out, init, false);
            let _ = write!(out, ", {} IN ", ident_of(var));
            write_expr(out, list, true);
            out.push_str(" | ");
            write_expr(out, body, false);
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::{CompareOp, ProjectionItem};
    use crate::schema::Direction;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn renders_nested_calls_with_indentation() {
        let this = Var::new("this");
        let rel = Var::new("this0");
        let actor = Var::new("this1");
        let out = Var::new("var2");
        let clauses = vec![
            Clause::matching(
                Pattern::node(NodePattern::new(&this, &labels(&["Movie"]))),
                Expr::eq(this.prop("title"), Expr::param("param0")),
            ),
            Clause::call(
                Imports::var(&this),
                vec![
                    Clause::matching(
                        Pattern::hop(
                            NodePattern::bound(&this),
                            RelPattern::new(Some(&rel), "ACTED_IN", Direction::Incoming),
                            NodePattern::new(&actor, &labels(&["Actor"])),
                        ),
                        Expr::Bool(true),
                    ),
                    Clause::return_single(
                        Expr::collect(
                            Expr::Projection(actor.clone(), vec![MapEntry::Property("name".into())]),
                            false,
                        ),
                        &out,
                    ),
                ],
            ),
            Clause::Return(Projection::items(vec![ProjectionItem::aliased(
                Expr::Projection(
                    this.clone(),
                    vec![
                        MapEntry::Property("title".into()),
                        MapEntry::Entry("actors".into(), out.expr()),
                    ],
                ),
                &this,
            )])),
        ];
        let expected = "MATCH (this:Movie)\n\
WHERE this.title = $param0\n\
CALL {\n    WITH this\n    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)\n    RETURN collect(this1 { .name }) AS var2\n}\n\
RETURN this { .title, actors: var2 } AS this";
        assert_eq!(render(&clauses), expected);
    }

    #[test]
    fn nested_boolean_groups_are_parenthesised() {
        let this = Var::new("this");
        let expr = Expr::and([
            Expr::or([this.prop("a").is_null(), this.prop("b").is_null()]),
            Expr::not(Expr::compare(
                this.prop("c"),
                CompareOp::StartsWith,
                Expr::param("param1"),
            )),
        ]);
        assert_eq!(
            render_expr(&expr),
            "(this.a IS NULL OR this.b IS NULL) AND NOT (this.c STARTS WITH $param1)"
        );
    }

    #[test]
    fn escapes_unusual_identifiers_and_strings() {
        assert_eq!(ident("my label"), "`my label`");
        assert_eq!(ident("we`ird"), "`we``ird`");
        assert_eq!(render_expr(&Expr::Str("say \"hi\"".into())), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn union_branches_repeat_imports() {
        let this = Var::new("this");
        let clauses = vec![Clause::Union {
            imports: Imports::Star,
            branches: vec![
                vec![Clause::return_single(Expr::Int(1), &this)],
                vec![Clause::return_single(Expr::Int(2), &this)],
            ],
        }];
        assert_eq!(
            render(&clauses),
            "CALL {\n    WITH *\n    RETURN 1 AS this\n    UNION\n    WITH *\n    RETURN 2 AS this\n}"
        );
    }
}
