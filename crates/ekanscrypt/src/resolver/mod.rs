//! Lexical scope resolution.
//!
//! One walk over the grouped forest that decides, for every identifier,
//! which body owns its variable:
//!
//! - label text is rewritten to its identity (`a`, `a:1`, ...), so a
//!   `var` redeclaration never collides with the outer variable
//! - labels owned by an enclosing body become [`NodeKind::Reference`]
//! - each lambda gets its free variables as `LambdaClosure` children, and
//!   its captured variables as a leading `Closure` in the body
//!
//! Class bodies are `noalias`: their names are not visible to methods.

mod scope;

pub use scope::{label_of, Access, Identity, Resolution, Scope, ScopeArena, ScopeId};

use crate::ast::{Node, NodeKind};
use crate::error::{Error, Result};

/// Resolves every identifier of a module in place.
pub fn resolve(module: &mut Vec<Node>) -> Result<()> {
    let mut resolver = Resolver::default();
    let root = resolver.scopes.push(None, false);
    for node in module.iter_mut() {
        resolver.walk(node, root)?;
    }

    let scope = resolver.scopes.get(root);
    if !scope.freevars.is_empty() {
        let names: Vec<&str> = scope.freevars.iter().map(String::as_str).collect();
        return Err(Error::Internal(format!(
            "found freevars in module scope: {}",
            names.join(", ")
        )));
    }

    if !scope.cellvars.is_empty() {
        let (line, column) = module.first().map_or((1, 0), |n| (n.line, n.column));
        let cells = references(&scope.cellvars, line, column);
        module.insert(
            0,
            Node::new(NodeKind::Closure, "", line, column).with_children(cells),
        );
    }

    tracing::debug!(
        cellvars = scope.cellvars.len(),
        scopes = resolver.count,
        "resolved module"
    );
    Ok(())
}

fn references<'a>(
    names: impl IntoIterator<Item = &'a String>,
    line: u32,
    column: u32,
) -> Vec<Node> {
    names
        .into_iter()
        .map(|name| Node::new(NodeKind::Reference, name.as_str(), line, column))
        .collect()
}

#[derive(Default)]
struct Resolver {
    scopes: ScopeArena,
    count: usize,
}

impl Resolver {
    fn walk(&mut self, node: &mut Node, scope: ScopeId) -> Result<()> {
        match node.kind {
            NodeKind::Label => self.access(node, scope, Access::Load),
            NodeKind::Class => return self.walk_class(node, scope),
            NodeKind::Import => self.walk_import(node, scope),
            NodeKind::DefineVar | NodeKind::DefineFinal | NodeKind::DefineStatic => {
                return self.walk_declaration(node, scope);
            }
            NodeKind::Operator2 if node.text == "=" => {
                if let [lhs, rhs] = node.children.as_mut_slice() {
                    self.walk(rhs, scope)?;
                    self.store(lhs, scope)?;
                }
            }
            NodeKind::Operator2 if node.children.len() == 2 => {
                if let [lhs, rhs] = node.children.as_mut_slice() {
                    self.walk(rhs, scope)?;
                    self.walk(lhs, scope)?;
                }
            }
            NodeKind::Call => {
                for (i, child) in node.children.iter_mut().enumerate() {
                    let keyword = i > 0 && child.is_operator("=");
                    match child.children.as_mut_slice() {
                        [_, rhs] if keyword => self.walk(rhs, scope)?,
                        _ => self.walk(child, scope)?,
                    }
                }
            }
            NodeKind::Lambda => return self.walk_lambda(node, scope, false),
            NodeKind::Foreach => {
                if let [target, iterable, body] = node.children.as_mut_slice() {
                    self.walk(iterable, scope)?;
                    self.store(target, scope)?;
                    self.walk(body, scope)?;
                }
            }
            NodeKind::Keyword if node.text == "for" => {
                // comprehension clause: [target, iterable, next clause?]
                let mut children = node.children.iter_mut();
                let target = children.next();
                if let Some(iterable) = children.next() {
                    self.walk(iterable, scope)?;
                }
                if let Some(target) = target {
                    self.store(target, scope)?;
                }
                for next in children {
                    self.walk(next, scope)?;
                }
            }
            NodeKind::Keyword if node.text == "catch" => {
                if let [test, body] = node.children.as_mut_slice() {
                    let binds = test.is_operator("as");
                    match test.children.as_mut_slice() {
                        [filter, name] if binds => {
                            self.walk(filter, scope)?;
                            self.store(name, scope)?;
                        }
                        _ => self.walk(test, scope)?,
                    }
                    self.walk(body, scope)?;
                }
            }
            NodeKind::With => {
                if let [items, body] = node.children.as_mut_slice() {
                    if items.kind == NodeKind::Tuple {
                        for item in items.children.iter_mut() {
                            self.walk_with_item(item, scope)?;
                        }
                    } else {
                        self.walk_with_item(items, scope)?;
                    }
                    self.walk(body, scope)?;
                }
            }
            _ => {
                for child in node.children.iter_mut() {
                    self.walk(child, scope)?;
                }
            }
        }
        Ok(())
    }

    fn access(&mut self, node: &mut Node, scope: ScopeId, access: Access) {
        let resolution = self.scopes.access(scope, &node.text, access);
        node.text = resolution.identity;
        if resolution.reference {
            node.kind = NodeKind::Reference;
        }
    }

    /// Resolves an assignment target.
    fn store(&mut self, target: &mut Node, scope: ScopeId) -> Result<()> {
        match target.kind {
            NodeKind::Label => self.access(target, scope, Access::Store),
            NodeKind::Tuple | NodeKind::TupleSeparator => {
                for child in target.children.iter_mut() {
                    self.store(child, scope)?;
                }
            }
            _ => self.walk(target, scope)?,
        }
        Ok(())
    }

    /// `name : expr`, `name = expr` or a bare expression.
    fn walk_with_item(&mut self, item: &mut Node, scope: ScopeId) -> Result<()> {
        let slice = item.kind == NodeKind::Slice;
        match item.children.as_mut_slice() {
            [name, expr] if slice => {
                self.walk(expr, scope)?;
                self.store(name, scope)
            }
            _ => self.walk(item, scope),
        }
    }

    fn walk_class(&mut self, node: &mut Node, scope: ScopeId) -> Result<()> {
        node.text = self.scopes.define(scope, &node.text);
        if let [bases, body] = node.children.as_mut_slice() {
            for base in bases.children.iter_mut() {
                let keyword = base.is_operator("=");
                match base.children.as_mut_slice() {
                    [_, rhs] if keyword => self.walk(rhs, scope)?,
                    _ => self.walk(base, scope)?,
                }
            }
            self.walk_lambda(body, scope, true)?;
        }
        Ok(())
    }

    fn walk_import(&mut self, node: &mut Node, scope: ScopeId) {
        node.text = self.scopes.define(scope, &node.text);
        let Some(fromlist) = node.children.get_mut(2) else {
            return;
        };
        for entry in fromlist.children.iter_mut() {
            if entry.kind == NodeKind::Label {
                entry.text = self.scopes.define(scope, &entry.text);
            } else if let Some(alias) = entry.children.get_mut(1) {
                alias.text = self.scopes.define(scope, &alias.text);
            }
        }
    }

    /// `var x` declares `x` and is replaced by the declared label.
    fn walk_declaration(&mut self, node: &mut Node, scope: ScopeId) -> Result<()> {
        let Some(mut target) = node.children.pop() else {
            return Err(Error::parse("expected label", node.line, node.column));
        };
        match target.kind {
            NodeKind::Label => target.text = self.scopes.define(scope, &target.text),
            NodeKind::Tuple => {
                for label in target.children.iter_mut() {
                    if label.kind != NodeKind::Label {
                        return Err(Error::parse("expected label", label.line, label.column));
                    }
                    label.text = self.scopes.define(scope, &label.text);
                }
            }
            _ => {
                return Err(Error::parse("expected label", target.line, target.column));
            }
        }
        *node = target;
        Ok(())
    }

    /// Opens a child scope for a lambda or class body.
    fn walk_lambda(&mut self, node: &mut Node, parent: ScopeId, noalias: bool) -> Result<()> {
        let child = self.scopes.push(Some(parent), noalias);
        self.count += 1;

        if !noalias && !node.text.is_empty() {
            node.text = self.scopes.define(parent, &node.text);
        }

        let [params, closure, body] = node.children.as_mut_slice() else {
            return Err(Error::Internal(format!(
                "malformed lambda at line {}",
                node.line
            )));
        };

        for param in params.children.iter_mut() {
            match param.kind {
                NodeKind::Label => param.text = self.scopes.define(child, &param.text),
                NodeKind::Operator2 if param.text == "=" => {
                    if let [name, default] = param.children.as_mut_slice() {
                        self.walk(default, parent)?;
                        name.text = self.scopes.define(child, &name.text);
                    }
                }
                NodeKind::Prefix if param.text == "*" || param.text == "**" => {
                    if let Some(name) = param.children.first_mut() {
                        name.text = self.scopes.define(child, &name.text);
                    }
                }
                _ => {}
            }
        }

        self.walk(body, child)?;

        let scope = self.scopes.get(child);
        let (line, column) = (node.line, node.column);
        closure.children = references(&scope.freevars, line, column);

        if !scope.cellvars.is_empty() {
            let cells = Node::new(NodeKind::Closure, "", line, column)
                .with_children(references(&scope.cellvars, line, column));
            let inner = std::mem::replace(body, Node::new(NodeKind::Block, "{closure}", line, column));
            body.children = vec![cells, inner];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn resolved(src: &str) -> Vec<String> {
        let mut forest = parse(tokenize(src).unwrap()).unwrap();
        resolve(&mut forest).unwrap();
        forest.iter().map(Node::to_sexpr).collect()
    }

    #[test]
    fn test_plain_module() {
        assert_eq!(resolved("x = 1; y = x"), vec!["(= x 1)", "(= y x)"]);
    }

    #[test]
    fn test_shadowing_program() {
        let forest = resolved("a=1; C=()=>{a+=1; var a=5; return a}; print(a, C(), a)");
        assert_eq!(
            forest,
            vec![
                "(cellvars &a)",
                "(= a 1)",
                "(= C (lambda (params) (freevars &a) (block (+= &a 1) (= a:1 5) (return a:1))))",
                "(call print a (call C) a)",
            ]
        );
    }

    #[test]
    fn test_closure_cells() {
        let forest = resolved("f = () => {x=0; return () => {x += 1}}");
        assert_eq!(
            forest,
            vec![
                "(= f (lambda (params) (freevars) (block (cellvars &x) \
                 (block (= x 0) (return (lambda (params) (freevars &x) (+= &x 1)))))))"
            ]
        );
    }

    #[test]
    fn test_parameters_and_defaults() {
        let forest = resolved("n = 1; f = (a, b=n, *rest, **kw) => a + b");
        assert_eq!(
            forest[1],
            "(= f (lambda (params a (= b n) (pre* rest) (pre** kw)) (freevars) (+ a b)))"
        );
    }

    #[test]
    fn test_parameter_shadows_module_name() {
        let forest = resolved("x = 1; f = (x) => x");
        assert_eq!(forest[1], "(= f (lambda (params x:1) (freevars) x:1))");
    }

    #[test]
    fn test_named_lambda_recursion() {
        let forest = resolved("fib(n) => { n < 2 ? n : fib(n - 1) + fib(n - 2) }");
        assert_eq!(forest[0], "(cellvars &fib)");
        assert!(forest[1].starts_with("(lambda fib (params n) (freevars &fib)"));
    }

    #[test]
    fn test_keyword_argument_names_untouched() {
        let forest = resolved("g = () => { x = 1; f(x=x) }");
        assert!(forest[0].contains("(call f (= x x))"));
    }

    #[test]
    fn test_foreach_and_comprehension_targets() {
        let forest = resolved("f = () => { for k, v in d { k }; [x for x in xs] }");
        assert!(forest[0].contains("(for (tuple k v) d k)"));
        assert!(forest[0].contains("(listcomp (for x xs) x)"));
    }

    #[test]
    fn test_catch_binds_name() {
        let forest = resolved("f = () => { try { g() } catch E as e { h(e) } }");
        assert!(forest[0].contains("(catch (as E e) (call h e))"));
    }

    #[test]
    fn test_class_body_is_noalias() {
        let forest = resolved("a = 1; class A() { b = a; m(self) => b }");
        assert_eq!(forest[0], "(cellvars &a)");
        assert!(forest[2].starts_with("(class A (bases)"));
        assert!(forest[2].contains("(freevars &a)"));
        assert!(forest[2].contains("(= b &a)"));
        // methods do not see the class namespace
        assert!(forest[2].contains("(lambda m (params self) (freevars) b)"));
    }

    #[test]
    fn test_declaration_replaced_by_label() {
        let forest = resolved("var x; final y = 2");
        assert_eq!(forest, vec!["x", "(= y 2)"]);
    }

    #[test]
    fn test_import_defines_names() {
        let forest = resolved("f = () => { from m import a, b as c; a + c }");
        assert!(forest[0].contains("(import m 0 \"m\" (tuple a (as b c)))"));
    }
}
