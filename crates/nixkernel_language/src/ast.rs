//! Abstract syntax tree for the Nix expression language.
//!
//! Child expressions are reference counted so thunks can point at them
//! without copying.

use std::rc::Rc;

use crate::span::Span;

/// Shared handle to an expression node.
pub type ExprRef = Rc<Expr>;

/// An expression with its source span.
#[derive(Debug, Clone)]
pub struct Expr {
    /// What the expression is.
    pub kind: ExprKind,
    /// Where it came from.
    pub span: Span,
}

impl Expr {
    /// Creates a shared expression node.
    #[must_use]
    pub fn new(kind: ExprKind, span: Span) -> ExprRef {
        Rc::new(Self { kind, span })
    }

    /// Returns the variable name if this is a bare identifier.
    #[must_use]
    pub fn as_var(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }
}

/// Expression variants.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal, possibly interpolated
    Str(Vec<StrPart>),
    /// Path literal as written
    Path(String),
    /// `<name>` search path lookup
    SearchPath(String),
    /// Variable reference
    Var(String),
    /// `e.a.b` or `e.a.b or default`
    Select {
        /// The set being selected from.
        target: ExprRef,
        /// Attribute path.
        path: Vec<AttrName>,
        /// Fallback when an attribute is missing.
        default: Option<ExprRef>,
    },
    /// `e ? a.b`
    HasAttr {
        /// The value being tested.
        target: ExprRef,
        /// Attribute path.
        path: Vec<AttrName>,
    },
    /// Function application `f x`
    Apply {
        /// The function.
        func: ExprRef,
        /// The argument, evaluated lazily.
        arg: ExprRef,
    },
    /// Function literal
    Lambda(Rc<Lambda>),
    /// `let ... in body`
    Let {
        /// The recursive bindings.
        bindings: Rc<Bindings>,
        /// The body evaluated with the bindings in scope.
        body: ExprRef,
    },
    /// `{ ... }` or `rec { ... }`
    AttrSet {
        /// Whether values see the set's own attributes.
        recursive: bool,
        /// The attribute definitions.
        bindings: Rc<Bindings>,
    },
    /// `[ ... ]`
    List(Vec<ExprRef>),
    /// `if c then a else b`
    If {
        /// Condition.
        cond: ExprRef,
        /// Taken when true.
        then_branch: ExprRef,
        /// Taken when false.
        else_branch: ExprRef,
    },
    /// `with scope; body`
    With {
        /// Set whose attributes come into scope.
        scope: ExprRef,
        /// Body expression.
        body: ExprRef,
    },
    /// `assert cond; body`
    Assert {
        /// Asserted condition.
        cond: ExprRef,
        /// Body expression.
        body: ExprRef,
    },
    /// `!e`
    Not(ExprRef),
    /// `-e`
    Negate(ExprRef),
    /// Binary operator application
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: ExprRef,
        /// Right operand.
        rhs: ExprRef,
    },
}

/// One piece of a string literal.
#[derive(Debug, Clone)]
pub enum StrPart {
    /// Literal text
    Literal(String),
    /// `${expr}`
    Interpolation(ExprRef),
}

/// An element of an attribute path.
#[derive(Debug, Clone)]
pub enum AttrName {
    /// `a` or `"a"`
    Static(String),
    /// `${e}` or `"${e}"`
    Dynamic(ExprRef),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `++`
    Concat,
    /// `//`
    Update,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `->`
    Implies,
}

impl BinaryOp {
    /// Returns the operator as written in source.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Concat => "++",
            Self::Update => "//",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Implies => "->",
        }
    }
}

/// A function literal.
#[derive(Debug, Clone)]
pub struct Lambda {
    /// Parameter binding form.
    pub param: Param,
    /// Function body.
    pub body: ExprRef,
    /// Name of the attribute or let binding the lambda was defined as.
    pub name: Option<String>,
    /// Position of the lambda.
    pub span: Span,
}

/// Lambda parameter forms.
#[derive(Debug, Clone)]
pub enum Param {
    /// `x: ...`
    Ident(String),
    /// `{ a, b ? d, ... } @ args: ...`
    Pattern {
        /// Declared formal arguments.
        formals: Vec<Formal>,
        /// Whether extra attributes are accepted.
        ellipsis: bool,
        /// Name bound to the whole argument set.
        bind: Option<String>,
    },
}

/// One formal argument of a pattern lambda.
#[derive(Debug, Clone)]
pub struct Formal {
    /// Argument name.
    pub name: String,
    /// Default used when the argument is absent.
    pub default: Option<ExprRef>,
}

/// The attribute definitions of a set or `let`.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    /// Statically named attributes in source order.
    pub attrs: Vec<AttrDef>,
    /// Attributes with computed names.
    pub dynamic: Vec<DynamicAttr>,
    /// Source expressions of `inherit (e) ...` clauses.
    pub inherit_sources: Vec<ExprRef>,
}

impl Bindings {
    /// Finds a statically named attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrDef> {
        self.attrs.iter().find(|def| def.name == name)
    }

    /// Returns the statically known names in source order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attrs.iter().map(|def| def.name.as_str())
    }
}

/// A statically named attribute definition.
#[derive(Debug, Clone)]
pub struct AttrDef {
    /// Attribute name.
    pub name: String,
    /// How the value is produced.
    pub value: AttrValue,
    /// Where the definition appears.
    pub span: Span,
}

/// How an attribute's value is produced.
#[derive(Debug, Clone)]
pub enum AttrValue {
    /// `name = expr;`
    Expr(ExprRef),
    /// `inherit name;`, looked up in the enclosing scope
    Inherit,
    /// `inherit (e) name;`, index into [`Bindings::inherit_sources`]
    InheritFrom(usize),
    /// Merged `name.a = ...; name.b = ...;` definitions
    Nested(Rc<Bindings>),
}

/// An attribute whose name is computed at evaluation time.
#[derive(Debug, Clone)]
pub struct DynamicAttr {
    /// Expression producing the name.
    pub name: ExprRef,
    /// Expression producing the value.
    pub value: ExprRef,
    /// Where the definition appears.
    pub span: Span,
}

/// Parsed interactive input.
#[derive(Debug, Clone)]
pub enum ReplInput {
    /// An ordinary expression.
    Expr(ExprRef),
    /// `name = expr;` definitions to add to the session.
    Bindings(Vec<(String, ExprRef)>),
}
