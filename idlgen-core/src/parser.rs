//! Parser for the interface description language.
//!
//! Single pass, one token of lookahead, no backtracking. The grammar:
//!
//! ```text
//! file          := "namespace" IDENT ";" decl*
//! decl          := structDecl | enumDecl | callbackDecl | interfaceDecl
//! structDecl    := "struct" IDENT "{" (type IDENT ";")* "}"
//! enumDecl      := "enum" IDENT "{" member ("," member)* ","? "}"
//! member        := IDENT ("=" "-"? INT)?
//! callbackDecl  := "callback" IDENT "(" params? ")" ("->" type)? ";"
//! interfaceDecl := "interface" IDENT "{" (ctor | method)* "}"
//! ctor          := IDENT "(" params? ")" ";"       // IDENT == interface name
//! method        := type IDENT "(" params? ")" "const"? ";"
//! param         := "const"? type ("*" | "&")? IDENT
//! type          := "vector" "<" type ">" | "void" | IDENT
//! ```

use crate::ast::{
    Ast, CallbackAst, Decl, EnumAst, EnumMemberAst, FieldAst, InterfaceAst, MethodAst, ParamAst,
    ParamMods, StructAst, TypeExpr,
};
use crate::error::Error;
use crate::lexer::{Token, TokenKind, lex};

pub fn parse(source: &str) -> Result<Ast, Error> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        source,
        tokens: &tokens,
        pos: 0,
    };
    parser.parse_file()
}

struct Parser<'src> {
    source: &'src str,
    tokens: &'src [Token],
    pos: usize,
}

impl<'src> Parser<'src> {
    fn parse_file(&mut self) -> Result<Ast, Error> {
        self.expect(TokenKind::Namespace, "expected 'namespace' directive")?;
        let namespace = self.expect_ident("namespace name")?;
        self.expect(TokenKind::Semi, "expected ';' after namespace name")?;

        let mut decls = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Struct => decls.push(Decl::Struct(self.parse_struct()?)),
                TokenKind::Enum => decls.push(Decl::Enum(self.parse_enum()?)),
                TokenKind::Callback => decls.push(Decl::Callback(self.parse_callback()?)),
                TokenKind::Interface => decls.push(Decl::Interface(self.parse_interface()?)),
                _ => return Err(self.unexpected("expected a declaration")),
            }
        }

        Ok(Ast { namespace, decls })
    }

    fn parse_struct(&mut self) -> Result<StructAst, Error> {
        self.advance(); // 'struct'
        let name = self.expect_ident("struct name")?;
        self.expect(TokenKind::LBrace, "expected '{' after struct name")?;

        let mut fields = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            let ty = self.parse_type()?;
            let field_name = self.expect_ident("field name")?;
            self.expect(TokenKind::Semi, "expected ';' after field")?;
            fields.push(FieldAst {
                name: field_name,
                ty,
            });
        }
        self.advance(); // '}'

        Ok(StructAst { name, fields })
    }

    fn parse_enum(&mut self) -> Result<EnumAst, Error> {
        self.advance(); // 'enum'
        let name = self.expect_ident("enum name")?;
        self.expect(TokenKind::LBrace, "expected '{' after enum name")?;

        let mut members = Vec::new();
        loop {
            let member_name = self.expect_ident("enum member name")?;
            let value = if self.peek().kind == TokenKind::Equal {
                self.advance();
                Some(self.parse_int_value()?)
            } else {
                None
            };
            members.push(EnumMemberAst {
                name: member_name,
                value,
            });

            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                    // Trailing comma before '}'.
                    if self.peek().kind == TokenKind::RBrace {
                        break;
                    }
                }
                TokenKind::RBrace => break,
                _ => return Err(self.unexpected("expected ',' or '}' in enum body")),
            }
        }
        self.advance(); // '}'

        Ok(EnumAst { name, members })
    }

    fn parse_callback(&mut self) -> Result<CallbackAst, Error> {
        self.advance(); // 'callback'
        let name = self.expect_ident("callback name")?;
        self.expect(TokenKind::LParen, "expected '(' after callback name")?;
        let params = self.parse_params()?;
        let return_ty = if self.peek().kind == TokenKind::Arrow {
            self.advance();
            self.parse_type()?
        } else {
            TypeExpr::Void
        };
        self.expect(TokenKind::Semi, "expected ';' after callback declaration")?;

        Ok(CallbackAst {
            name,
            params,
            return_ty,
        })
    }

    fn parse_interface(&mut self) -> Result<InterfaceAst, Error> {
        self.advance(); // 'interface'
        let name = self.expect_ident("interface name")?;
        self.expect(TokenKind::LBrace, "expected '{' after interface name")?;

        let mut ctor_params = None;
        let mut methods = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            let return_ty = self.parse_type()?;
            // A '(' right after a type that names the interface itself
            // is a constructor declaration, not a method.
            if self.peek().kind == TokenKind::LParen {
                if return_ty != TypeExpr::Name(name.clone()) {
                    return Err(self.unexpected("expected method name before '('"));
                }
                if ctor_params.is_some() {
                    return Err(self.unexpected("duplicate constructor declaration"));
                }
                self.advance(); // '('
                ctor_params = Some(self.parse_params()?);
                self.expect(TokenKind::Semi, "expected ';' after constructor")?;
                continue;
            }

            let method_name = self.expect_ident("method name")?;
            self.expect(TokenKind::LParen, "expected '(' after method name")?;
            let params = self.parse_params()?;
            let is_const = if self.peek().kind == TokenKind::Const {
                self.advance();
                true
            } else {
                false
            };
            self.expect(TokenKind::Semi, "expected ';' after method declaration")?;
            methods.push(MethodAst {
                name: method_name,
                return_ty,
                params,
                is_const,
            });
        }
        self.advance(); // '}'

        Ok(InterfaceAst {
            name,
            ctor_params: ctor_params.unwrap_or_default(),
            methods,
        })
    }

    /// Parse a parenthesized parameter list; the opening '(' has been
    /// consumed, the closing ')' is consumed here.
    fn parse_params(&mut self) -> Result<Vec<ParamAst>, Error> {
        let mut params = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.advance();
            return Ok(params);
        }

        loop {
            let is_const = if self.peek().kind == TokenKind::Const {
                self.advance();
                true
            } else {
                false
            };
            let ty = self.parse_type()?;
            let (is_pointer, is_reference) = match self.peek().kind {
                TokenKind::Star => {
                    self.advance();
                    (true, false)
                }
                TokenKind::Amp => {
                    self.advance();
                    (false, true)
                }
                _ => (false, false),
            };
            let name = self.expect_ident("parameter name")?;
            params.push(ParamAst {
                name,
                ty,
                mods: ParamMods {
                    is_const,
                    is_pointer,
                    is_reference,
                },
            });

            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RParen => break,
                _ => return Err(self.unexpected("expected ',' or ')' in parameter list")),
            }
        }
        self.advance(); // ')'
        Ok(params)
    }

    fn parse_type(&mut self) -> Result<TypeExpr, Error> {
        match self.peek().kind {
            TokenKind::Void => {
                self.advance();
                Ok(TypeExpr::Void)
            }
            TokenKind::Vector => {
                self.advance();
                self.expect(TokenKind::Lt, "expected '<' after 'vector'")?;
                let inner = self.parse_type()?;
                self.expect(TokenKind::Gt, "expected '>' to close 'vector<...'")?;
                Ok(TypeExpr::Vector(Box::new(inner)))
            }
            TokenKind::Ident => {
                let token = self.advance();
                Ok(TypeExpr::Name(token.text(self.source).to_string()))
            }
            _ => Err(self.unexpected("expected a type name")),
        }
    }

    fn parse_int_value(&mut self) -> Result<i64, Error> {
        let negative = if self.peek().kind == TokenKind::Minus {
            self.advance();
            true
        } else {
            false
        };
        let token = self.expect(TokenKind::IntLiteral, "expected an integer literal")?;
        let text = token.text(self.source);
        let value: i64 = text.parse().map_err(|_| {
            Error::syntax(
                token.line,
                token.column,
                format!("integer literal '{text}' out of range"),
            )
        })?;
        Ok(if negative { -value } else { value })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, Error> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(message))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, Error> {
        let token = self.expect(TokenKind::Ident, &format!("expected {what}"))?;
        Ok(token.text(self.source).to_string())
    }

    fn unexpected(&self, message: &str) -> Error {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", token.text(self.source))
        };
        Error::syntax(token.line, token.column, format!("{message}, found {found}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_struct_and_interface() {
        let ast = parse(
            "namespace demo;\n\
             struct Point { int x; int y; }\n\
             interface Calculator { int add(int a, int b); }",
        )
        .expect("parse");
        assert_eq!(ast.namespace, "demo");
        assert_eq!(ast.decls.len(), 2);
        let Decl::Interface(iface) = &ast.decls[1] else {
            panic!("expected interface");
        };
        assert_eq!(iface.methods[0].name, "add");
        assert_eq!(iface.methods[0].params.len(), 2);
    }

    #[test]
    fn parses_enum_with_explicit_and_implicit_values() {
        let ast = parse("namespace demo; enum Mode { Off = 0, Slow, Fast = 10, }").expect("parse");
        let Decl::Enum(e) = &ast.decls[0] else {
            panic!("expected enum");
        };
        assert_eq!(e.members.len(), 3);
        assert_eq!(e.members[1].value, None);
        assert_eq!(e.members[2].value, Some(10));
    }

    #[test]
    fn parses_negative_enum_value() {
        let ast = parse("namespace demo; enum Status { Error = -1, Ok = 0 }").expect("parse");
        let Decl::Enum(e) = &ast.decls[0] else {
            panic!("expected enum");
        };
        assert_eq!(e.members[0].value, Some(-1));
    }

    #[test]
    fn parses_callback_with_and_without_return() {
        let ast = parse(
            "namespace demo;\n\
             callback OnProgress(int current, int total);\n\
             callback Filter(int value) -> bool;",
        )
        .expect("parse");
        let Decl::Callback(plain) = &ast.decls[0] else {
            panic!("expected callback");
        };
        assert_eq!(plain.return_ty, TypeExpr::Void);
        let Decl::Callback(filter) = &ast.decls[1] else {
            panic!("expected callback");
        };
        assert_eq!(filter.return_ty, TypeExpr::Name("bool".to_string()));
    }

    #[test]
    fn parses_constructor_and_const_method() {
        let ast = parse(
            "namespace demo;\n\
             interface Detector {\n\
                 Detector(string model, double threshold);\n\
                 int count() const;\n\
             }",
        )
        .expect("parse");
        let Decl::Interface(iface) = &ast.decls[0] else {
            panic!("expected interface");
        };
        assert_eq!(iface.ctor_params.len(), 2);
        assert!(iface.methods[0].is_const);
    }

    #[test]
    fn parses_pointer_and_reference_params() {
        let ast = parse(
            "namespace demo;\n\
             struct Point { int x; }\n\
             interface I { void f(const Point& p, Point* out, bytes data); }",
        )
        .expect("parse");
        let Decl::Interface(iface) = &ast.decls[1] else {
            panic!("expected interface");
        };
        let mods: Vec<_> = iface.methods[0].params.iter().map(|p| p.mods).collect();
        assert!(mods[0].is_const && mods[0].is_reference);
        assert!(mods[1].is_pointer && !mods[1].is_const);
        assert!(!mods[2].is_pointer && !mods[2].is_reference);
    }

    #[test]
    fn parses_vector_return() {
        let ast = parse(
            "namespace demo;\n\
             struct Point { int x; }\n\
             interface Geo { vector<Point> line(int n); }",
        )
        .expect("parse");
        let Decl::Interface(iface) = &ast.decls[1] else {
            panic!("expected interface");
        };
        assert_eq!(
            iface.methods[0].return_ty,
            TypeExpr::Vector(Box::new(TypeExpr::Name("Point".to_string())))
        );
    }

    #[test]
    fn requires_namespace_first() {
        let err = parse("struct Point { int x; }").unwrap_err();
        assert!(matches!(err, Error::Syntax { line: 1, column: 1, .. }));
    }

    #[test]
    fn reports_position_of_bad_token() {
        let err = parse("namespace demo;\nstruct Point { int }").unwrap_err();
        let Error::Syntax { line, column, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(line, 2);
        assert_eq!(column, 20);
    }

    #[test]
    fn rejects_method_on_missing_semicolon() {
        let err = parse("namespace demo; interface I { int f() }").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }
}
