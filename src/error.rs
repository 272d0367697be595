use crate::span::Span;
use inflector::cases::classcase::to_class_case;
use inflector::cases::snakecase::to_snake_case;
use std::fmt;
use thiserror::Error;

/// Absorbs a sub-rule's result into the surrounding rule's sinks: whatever
/// the sub-rule raised is split out by severity, and its value flows on, or
/// the recovery expression takes over when the sub-rule produced none.
macro_rules! check {
    ($fn_expr: expr, $error_recovery: expr, $warnings: ident, $errors: ident) => {{
        let (value, raised) = $fn_expr.into_parts();
        for raised in raised {
            match raised {
                crate::error::Raised::Warning(warning) => $warnings.push(warning),
                crate::error::Raised::Error(error) => $errors.push(error),
            }
        }
        match value {
            Some(value) => value,
            None => $error_recovery,
        }
    }};
}

/// Raises a (usually style) warning when the condition does not hold.
pub(crate) fn warn_unless(
    held: bool,
    warnings: &mut Vec<CompileWarning>,
    span: Span,
    warning: Warning,
) {
    if !held {
        warnings.push(CompileWarning {
            span,
            warning_content: warning,
        });
    }
}

/// A rule that produced a value, whether cleanly or by local recovery.
pub(crate) fn recovered<T>(
    value: T,
    warnings: Vec<CompileWarning>,
    errors: Vec<CompileError>,
) -> CompileResult<T> {
    CompileResult::assemble(Some(value), warnings, errors)
}

/// A rule that could not produce a value at all.
pub(crate) fn failed<T>(
    warnings: Vec<CompileWarning>,
    errors: Vec<CompileError>,
) -> CompileResult<T> {
    CompileResult::assemble(None, warnings, errors)
}

/// A diagnostic as first raised, still carrying its typed payload so callers
/// can re-label or match on it before rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Raised {
    Warning(CompileWarning),
    Error(CompileError),
}

impl Raised {
    pub fn severity(&self) -> Severity {
        match self {
            Raised::Warning(_) => Severity::Warning,
            Raised::Error(_) => Severity::Error,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Raised::Warning(warning) => warning.to_diagnostic(),
            Raised::Error(error) => error.to_diagnostic(),
        }
    }
}

/// What every checking rule hands back: an optional value (absent when the
/// rule could not even recover) plus the diagnostics it raised, kept in
/// emission order until a caller settles them into its own sinks.
#[derive(Debug, Clone)]
pub struct CompileResult<T> {
    pub value: Option<T>,
    raised: Vec<Raised>,
}

impl<T> CompileResult<T> {
    fn assemble(
        value: Option<T>,
        warnings: Vec<CompileWarning>,
        errors: Vec<CompileError>,
    ) -> CompileResult<T> {
        let mut raised = Vec::with_capacity(warnings.len() + errors.len());
        raised.extend(warnings.into_iter().map(Raised::Warning));
        raised.extend(errors.into_iter().map(Raised::Error));
        CompileResult { value, raised }
    }

    /// A failure carrying exactly one error.
    pub fn from_error(error: CompileError) -> CompileResult<T> {
        CompileResult {
            value: None,
            raised: vec![Raised::Error(error)],
        }
    }

    /// The value and the raised stream, for callers that route diagnostics
    /// themselves. The `check!` macro's working end.
    pub fn into_parts(self) -> (Option<T>, Vec<Raised>) {
        (self.value, self.raised)
    }

    /// Drains everything raised into the caller's sinks and hands back the
    /// value.
    pub fn settle(
        self,
        warnings: &mut Vec<CompileWarning>,
        errors: &mut Vec<CompileError>,
    ) -> Option<T> {
        for raised in self.raised {
            match raised {
                Raised::Warning(warning) => warnings.push(warning),
                Raised::Error(error) => errors.push(error),
            }
        }
        self.value
    }

    pub fn has_errors(&self) -> bool {
        self.raised
            .iter()
            .any(|raised| raised.severity() == Severity::Error)
    }

    pub fn errors(&self) -> Vec<&CompileError> {
        self.raised
            .iter()
            .filter_map(|raised| match raised {
                Raised::Error(error) => Some(error),
                Raised::Warning(_) => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<&CompileWarning> {
        self.raised
            .iter()
            .filter_map(|raised| match raised {
                Raised::Warning(warning) => Some(warning),
                Raised::Error(_) => None,
            })
            .collect()
    }

    /// Re-labels raised errors in place, so a shared rule's failure can
    /// surface under the calling rule's own diagnostic id.
    pub fn map_errors(
        self,
        mut relabel: impl FnMut(CompileError) -> CompileError,
    ) -> CompileResult<T> {
        CompileResult {
            value: self.value,
            raised: self
                .raised
                .into_iter()
                .map(|raised| match raised {
                    Raised::Error(error) => Raised::Error(relabel(error)),
                    warning => warning,
                })
                .collect(),
        }
    }
}

/// A rendered diagnostic: the stable code, the severity, an optional source
/// span and the human message. This is the shape downstream consumers see.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub span: Option<Span>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

pub type DiagnosticStream = Vec<Diagnostic>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileWarning {
    pub span: Span,
    pub warning_content: Warning,
}

impl CompileWarning {
    pub fn to_friendly_warning_string(&self) -> String {
        self.warning_content.to_string()
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            code: self.warning_content.code(),
            severity: Severity::Warning,
            span: Some(self.span.clone()),
            message: self.to_friendly_warning_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Warning {
    NonClassCaseRecordName { record_name: String },
    NonClassCaseEnumName { enum_name: String },
    NonClassCaseEnumVariantName { variant_name: String },
    NonClassCaseModalName { modal_name: String },
    NonClassCaseModalStateName { state_name: String },
    NonClassCaseClassName { class_name: String },
    NonSnakeCaseFieldName { field_name: String },
    NonSnakeCaseProcedureName { name: String },
    LossOfPrecision { initial_type: String, cast_to: String },
    UnreachableCode,
}

impl Warning {
    pub fn code(&self) -> &'static str {
        use Warning::*;
        match self {
            NonClassCaseRecordName { .. } => "W-STYLE-0001",
            NonClassCaseEnumName { .. } => "W-STYLE-0002",
            NonClassCaseEnumVariantName { .. } => "W-STYLE-0003",
            NonClassCaseModalName { .. } => "W-STYLE-0004",
            NonClassCaseModalStateName { .. } => "W-STYLE-0005",
            NonClassCaseClassName { .. } => "W-STYLE-0006",
            NonSnakeCaseFieldName { .. } => "W-STYLE-0007",
            NonSnakeCaseProcedureName { .. } => "W-STYLE-0008",
            LossOfPrecision { .. } => "W-CAST-0001",
            UnreachableCode => "W-FLOW-0001",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Warning::*;
        match self {
            NonClassCaseRecordName { record_name } => write!(
                f,
                "Record name \"{}\" is not idiomatic. Records should have a ClassCase name, like \
                 \"{}\".",
                record_name,
                to_class_case(record_name)
            ),
            NonClassCaseEnumName { enum_name } => write!(
                f,
                "Enum \"{}\"'s capitalization is not idiomatic. Enums should have a ClassCase \
                 name, like \"{}\".",
                enum_name,
                to_class_case(enum_name)
            ),
            NonClassCaseEnumVariantName { variant_name } => write!(
                f,
                "Enum variant name \"{}\" is not idiomatic. Enum variant names should be \
                 ClassCase, like \"{}\".",
                variant_name,
                to_class_case(variant_name)
            ),
            NonClassCaseModalName { modal_name } => write!(
                f,
                "Modal type name \"{}\" is not idiomatic. Modal types should have a ClassCase \
                 name, like \"{}\".",
                modal_name,
                to_class_case(modal_name)
            ),
            NonClassCaseModalStateName { state_name } => write!(
                f,
                "Modal state name \"{}\" is not idiomatic. States should have a ClassCase name, \
                 like \"{}\".",
                state_name,
                to_class_case(state_name)
            ),
            NonClassCaseClassName { class_name } => write!(
                f,
                "Class name \"{}\" is not idiomatic. Classes should have a ClassCase name, like \
                 \"{}\".",
                class_name,
                to_class_case(class_name)
            ),
            NonSnakeCaseFieldName { field_name } => write!(
                f,
                "Field name \"{}\" is not idiomatic. Field names should have a snake_case name, \
                 like \"{}\".",
                field_name,
                to_snake_case(field_name)
            ),
            NonSnakeCaseProcedureName { name } => write!(
                f,
                "Procedure name \"{}\" is not idiomatic. Procedure names should be snake_case, \
                 like \"{}\".",
                name,
                to_snake_case(name)
            ),
            LossOfPrecision {
                initial_type,
                cast_to,
            } => write!(
                f,
                "This cast, from type {} to type {}, will lose precision.",
                initial_type, cast_to
            ),
            UnreachableCode => write!(f, "This code is unreachable."),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompileError {
    // --- name resolution & scopes ---
    #[error("Name \"{name}\" does not exist in this scope.")]
    UnknownName { name: String, span: Span },
    #[error("Identifier \"{name}\" was used as a value, but it is actually a {what_it_is}.")]
    NotAValue {
        name: String,
        what_it_is: &'static str,
        span: Span,
    },
    #[error("Path \"{path}\" does not name a type in scope.")]
    UnknownTypePath { path: String, span: Span },
    #[error("Module \"{path}\" does not exist or is not visible from here.")]
    ModuleNotFound { path: String, span: Span },
    #[error("The name \"{name}\" is already bound in this scope; duplicate introduction.")]
    DuplicateIntroduction { name: String, span: Span },
    #[error(
        "Binding \"{name}\" would shadow an existing binding. Shadowing requires the `shadow` \
         keyword."
    )]
    ShadowRequiresKeyword { name: String, span: Span },
    #[error("`shadow` binding \"{name}\" has no outer binding to shadow.")]
    ShadowTargetMissing { name: String, span: Span },
    #[error("\"{name}\" is a reserved name and cannot be declared.")]
    ReservedName { name: String, span: Span },
    #[error("\"{name}\" is declared in module \"{module}\" and is not visible from here.")]
    NotVisible {
        name: String,
        module: String,
        span: Span,
    },
    #[error("Class \"{path}\" is not defined.")]
    SuperclassUndefined { path: String, span: Span },

    // --- type well-formedness ---
    #[error("\"{name}\" is not a primitive type.")]
    UnknownPrimitive { name: String, span: Span },
    #[error("A union type requires at least two member types.")]
    UnionTooFewMembers { span: Span },
    #[error("Type \"{path}\" expects {expected} generic argument(s) but {received} were supplied.")]
    TypeArityMismatch {
        path: String,
        expected: usize,
        received: usize,
        span: Span,
    },
    #[error("\"{state}\" is not a declared state of modal type \"{path}\".")]
    UnknownModalState {
        path: String,
        state: String,
        span: Span,
    },
    #[error("The `shared` permission is reserved and not supported in Cursive0.")]
    SharedPermUnsupported { span: Span },
    #[error(
        "This array length is not a compile-time constant. Array lengths must be integer \
         literals or paths to integer `static let` items."
    )]
    ConstLenInvalid { span: Span },
    #[error("Type alias \"{path}\" expands into itself.")]
    AliasCycle { path: String, span: Span },
    #[error("Generic parameter \"{param}\" does not satisfy the bound \"{class_path}\".")]
    GenericBoundUnsatisfied {
        param: String,
        class_path: String,
        span: Span,
    },

    // --- equivalence / subtyping ---
    #[error("Type mismatch: expected {expected}, found {received}. {help}")]
    TypeMismatch {
        expected: String,
        received: String,
        help: String,
        span: Span,
    },
    #[error(
        "Modal state type {state_type} cannot subsume into {modal_type}: the modal is not \
         niche-eligible."
    )]
    SubsumptionModalNonNiche {
        state_type: String,
        modal_type: String,
        span: Span,
    },

    // --- literals ---
    #[error(
        "A null literal has no type of its own; it needs a pointer-typed context to check \
         against."
    )]
    NullLiteralNeedsContext { span: Span },
    #[error("Integer literal {literal} does not fit in type {ty}.")]
    IntLiteralOutOfRange {
        literal: String,
        ty: String,
        span: Span,
    },

    // --- records, fields ---
    #[error(
        "Record \"{path}\" cannot be default-constructed: field \"{field}\" has no initializer."
    )]
    RecordDefaultInit {
        path: String,
        field: String,
        span: Span,
    },
    #[error("Field \"{field}\" does not exist on type {ty}. Available fields are: {available}.")]
    UnknownField {
        field: String,
        ty: String,
        available: String,
        span: Span,
    },
    #[error("Field \"{field}\" of \"{ty}\" is not visible from this module.")]
    FieldNotVisible {
        field: String,
        ty: String,
        span: Span,
    },
    #[error(
        "Union values cannot be accessed directly; match on the union to take its members apart."
    )]
    UnionDirectAccess { span: Span },
    #[error(
        "Field \"{field}\" lives in a state of modal type {ty}; match on the state before \
         accessing it."
    )]
    ModalFieldNeedsState {
        field: String,
        ty: String,
        span: Span,
    },

    // --- tuples, arrays, indexing ---
    #[error("Tuple index {index} is out of bounds for a tuple of {len} elements.")]
    TupleIndexOutOfBounds {
        index: u64,
        len: usize,
        span: Span,
    },
    #[error("Tuple elements can only be accessed with an integer literal index.")]
    TupleIndexNotConst { span: Span },
    #[error("Array index {index} is out of bounds for an array of length {len}.")]
    ArrayIndexOutOfBounds { index: u64, len: u64, span: Span },
    #[error(
        "Array indices must be compile-time constants; slice the array with a range if the \
         index is dynamic."
    )]
    ArrayIndexNotConst { span: Span },
    #[error("Slices cannot be indexed directly; slice with a range instead.")]
    IndexSliceDirect { span: Span },
    #[error("Type {ty} cannot be indexed.")]
    IndexBaseNotIndexable { ty: String, span: Span },

    // --- calls ---
    #[error("This expression has type {ty}, which is not callable.")]
    CalleeNotFunction { ty: String, span: Span },
    #[error("This call expects {expected} argument(s) but {received} were supplied.")]
    ArgCountMismatch {
        expected: usize,
        received: usize,
        span: Span,
    },
    #[error("This parameter takes its argument by move; write `move` on the argument.")]
    CallMoveMissing { span: Span },
    #[error("This parameter does not take its argument by move; remove the `move`.")]
    CallMoveUnexpected { span: Span },
    #[error("A permissioned parameter requires a place expression as its argument.")]
    CallArgNotPlace { span: Span },
    #[error("The argument's type {received} does not subtype the parameter's type {expected}.")]
    CallArgType {
        expected: String,
        received: String,
        span: Span,
    },

    // --- methods ---
    #[error("No method \"{name}\" found for type {ty}.")]
    UnknownMethod {
        name: String,
        ty: String,
        span: Span,
    },
    #[error(
        "Method \"{name}\" is ambiguous for type {ty}: default implementations exist in \
         unrelated classes {first} and {second}."
    )]
    AmbiguousMethod {
        name: String,
        ty: String,
        first: String,
        second: String,
        span: Span,
    },

    // --- pointers, move, alloc, casts ---
    #[error("The operand of `&` must be a place expression.")]
    AddressOfNonPlace { span: Span },
    #[error("Type {ty} cannot be dereferenced.")]
    DerefNonPtr { ty: String, span: Span },
    #[error("This pointer is in state @{state} and cannot be dereferenced.")]
    DerefInvalidState { state: String, span: Span },
    #[error("Dereferencing a raw pointer requires an `unsafe` block.")]
    RawDerefOutsideUnsafe { span: Span },
    #[error("`transmute` requires an `unsafe` block.")]
    TransmuteOutsideUnsafe { span: Span },
    #[error("`transmute` operands must be bit-copyable; {ty} is not.")]
    TransmuteNonBitcopy { ty: String, span: Span },
    #[error("Cannot cast {from} to {to}.")]
    CastInvalid {
        from: String,
        to: String,
        span: Span,
    },
    #[error("The operand of `move` must be a place expression.")]
    MoveNonPlace { span: Span },
    #[error("No region named \"{name}\" is active here.")]
    UnknownRegion { name: String, span: Span },
    #[error("`alloc` requires an enclosing `region` statement (or an explicit region alias).")]
    AllocOutsideRegion { span: Span },

    // --- statements ---
    #[error("Cannot assign to \"{name}\": it was bound with `let` and is immutable.")]
    AssignImmutable { name: String, span: Span },
    #[error("Cannot assign through a `const` permission.")]
    AssignConst { span: Span },
    #[error("This pattern is refutable and cannot be used in a `let`/`var` binding.")]
    LetRefutablePattern { span: Span },
    #[error("`break` outside of a loop.")]
    BreakOutsideLoop { span: Span },
    #[error("`continue` outside of a loop.")]
    ContinueOutsideLoop { span: Span },
    #[error("`defer` bodies must type to `()`.")]
    DeferNonUnit { span: Span },
    #[error("`defer` bodies cannot contain `return`, `break`, or `continue`.")]
    DeferNonLocalExit { span: Span },
    #[error("`frame` requires an active enclosing `region`.")]
    FrameWithoutRegion { span: Span },
    #[error("`static_assert` conditions must be compile-time boolean literals.")]
    StaticAssertNotConst { span: Span },
    #[error("`static_assert` condition is false.")]
    StaticAssertFailed { span: Span },
    #[error("`result` statements are only valid inside a `parallel` block.")]
    ResultOutsideParallel { span: Span },
    #[error("Operator \"{op}\" is not defined for type {ty}.")]
    BinaryOpUndefined { op: String, ty: String, span: Span },

    // --- patterns & match ---
    #[error("This tuple pattern has {received} element(s) but the matched tuple has {expected}.")]
    PatternTupleArity {
        expected: usize,
        received: usize,
        span: Span,
    },
    #[error("Field \"{field}\" appears more than once in this pattern.")]
    PatternDupField { field: String, span: Span },
    #[error("Pattern field \"{field}\" does not exist on \"{ty}\".")]
    PatternUnknownField {
        field: String,
        ty: String,
        span: Span,
    },
    #[error("This pattern does not fit a scrutinee of type {ty}.")]
    PatternShape { ty: String, span: Span },
    #[error("This range pattern is empty.")]
    RangePatternEmpty { span: Span },
    #[error("Range pattern endpoints must be compile-time primitive constants.")]
    RangePatternNotConst { span: Span },
    #[error("Match arms disagree on their result type: {first} vs {second}.")]
    MatchArmTypeMismatch {
        first: String,
        second: String,
        span: Span,
    },
    #[error("Match on enum {ty} is missing variant(s): {missing}.")]
    MatchEnumNonExhaustive {
        ty: String,
        missing: String,
        span: Span,
    },
    #[error("Match on modal type {ty} is missing state(s): {missing}.")]
    MatchModalNonExhaustive {
        ty: String,
        missing: String,
        span: Span,
    },
    #[error("Match on union {ty} is missing member type(s): {missing}.")]
    MatchUnionNonExhaustive {
        ty: String,
        missing: String,
        span: Span,
    },
    #[error("This match has no irrefutable arm and the scrutinee's type cannot be enumerated.")]
    MatchNoIrrefutableArm { span: Span },

    // --- declarations ---
    #[error("Field \"{name}\" is declared more than once in this record.")]
    RecordDupField { name: String, span: Span },
    #[error("Variant \"{name}\" is declared more than once in this enum.")]
    EnumDupVariant { name: String, span: Span },
    #[error("State \"{name}\" is declared more than once in this modal type.")]
    ModalDupState { name: String, span: Span },
    #[error(
        "Implementation of class \"{class_path}\" is incomplete; missing {what}: {missing}."
    )]
    ImplIncomplete {
        class_path: String,
        what: &'static str,
        missing: String,
        span: Span,
    },
    #[error(
        "Cannot implement class \"{class_path}\" for \"{ty}\" here: neither is declared in this \
         module."
    )]
    OrphanImpl {
        class_path: String,
        ty: String,
        span: Span,
    },
    #[error("Class hierarchy of \"{class_path}\" has no consistent C3 linearization.")]
    LinearizationFailed { class_path: String, span: Span },

    // --- borrow / bind check ---
    #[error("\"{name}\" was moved and cannot be used again.")]
    PlaceMoved { name: String, span: Span },
    #[error("Field \"{field}\" of \"{name}\" was moved out and cannot be used.")]
    PlacePartiallyMoved {
        name: String,
        field: String,
        span: Span,
    },
    #[error(
        "The unique permission for this place is inactive here (it is lent out for the \
         duration of a call)."
    )]
    PlaceUniqueInactive { span: Span },
    #[error("Cannot move \"{name}\": the binding is immovable.")]
    MoveImmovable { name: String, span: Span },
    #[error("Cannot move \"{name}\": it was already moved.")]
    MoveAlreadyMoved { name: String, span: Span },
    #[error("Cannot move field \"{field}\": it was already moved out of \"{name}\".")]
    MoveFieldAlreadyMoved {
        name: String,
        field: String,
        span: Span,
    },
    #[error("Cannot move field \"{field}\": the path to it is not `unique` all the way down.")]
    MoveFieldNonUnique { field: String, span: Span },
    #[error("This parameter takes its argument by move; write `move` on the argument.")]
    ArgPassMoveMissing { span: Span },
    #[error(
        "The branches of this expression leave bindings in incompatible states and cannot be \
         joined."
    )]
    BindJoinMismatch { span: Span },
    #[error("This loop's binding states do not stabilize; the loop body keeps moving bindings.")]
    LoopFixpointOverflow { span: Span },

    // --- concurrency & async ---
    #[error("The `parallel` domain must implement the ExecutionDomain capability.")]
    ParallelDomainNotExecutionDomain { ty: String, span: Span },
    #[error("`spawn` is only valid inside a `parallel` block.")]
    SpawnOutsideParallel { span: Span },
    #[error("`dispatch` is only valid inside a `parallel` block.")]
    DispatchOutsideParallel { span: Span },
    #[error("`wait` expects a Spawned or Tracked handle; this has type {ty}.")]
    WaitNotSpawned { ty: String, span: Span },
    #[error("`wait` cannot be used while keys are held.")]
    WaitWhileKeysHeld { span: Span },
    #[error("`dispatch` iterates a Range; this has type {ty}.")]
    DispatchRangeExpected { ty: String, span: Span },
    #[error("The `reduce` operator must be a binary operation over the dispatch body type.")]
    DispatchReduceShape { span: Span },
    #[error("\"{name}\" was moved into a spawned task and cannot be used afterwards.")]
    UseAfterMoveAcrossSpawn { name: String, span: Span },
    #[error("`var` binding \"{name}\" cannot be captured by a spawned task without `shared`.")]
    VarCaptureWithoutShared { name: String, span: Span },
    #[error(
        "`unique` binding \"{name}\" can only be captured by a spawned task when it is listed \
         in the spawn's `move` options."
    )]
    UniqueCaptureNotMoved { name: String, span: Span },
    #[error("GPU domains cannot capture `shared` places.")]
    GpuSharedCapture { span: Span },
    #[error("GPU domains cannot capture host pointers.")]
    GpuHostPointerCapture { span: Span },
    #[error("GPU `parallel` blocks cannot nest another GPU `parallel`.")]
    GpuNestedParallel { span: Span },
    #[error("GPU domains cannot allocate from the host heap.")]
    GpuHeapAlloc { span: Span },
    #[error("`yield` requires the enclosing procedure to return an async-shaped type.")]
    YieldOutsideAsync { span: Span },
    #[error("The yielded value's type {received} does not subsume into the async out type {expected}.")]
    YieldTypeMismatch {
        expected: String,
        received: String,
        span: Span,
    },
    #[error("`yield from` expects an async-shaped generator; this has type {ty}.")]
    YieldFromNotAsync { ty: String, span: Span },
    #[error("`sync` expects an async with out type `()`; this has type {ty}.")]
    SyncNotAsync { ty: String, span: Span },
    #[error("`sync` cannot be used inside an async context.")]
    SyncInAsyncContext { span: Span },
    #[error("Every arm of `race` must be an async-shaped expression; this has type {ty}.")]
    RaceArmNotAsync { ty: String, span: Span },
    #[error("Every element of `all` must be an async-shaped expression; this has type {ty}.")]
    AllElemNotAsync { ty: String, span: Span },
    #[error("`?` requires a union of a success type and an error type; this has type {ty}.")]
    PropagateShape { ty: String, span: Span },
    #[error("The propagated error type {received} does not fit the procedure's return type {expected}.")]
    PropagateReturnMismatch {
        expected: String,
        received: String,
        span: Span,
    },

    // --- attributes ---
    #[error("Unknown attribute \"{name}\".")]
    UnknownAttribute { name: String, span: Span },
    #[error("Attribute \"{name}\" cannot be applied to {target}.")]
    AttributeWrongTarget {
        name: String,
        target: &'static str,
        span: Span,
    },

    // --- init planner / project ---
    #[error("Module initialization cycle: {cycle}.")]
    InitCycle { cycle: String },
    #[error("An executable assembly requires a `main` procedure in its root module.")]
    NoMainProcedure,
    #[error("Multiple `main` procedures found; an executable assembly requires exactly one.")]
    MultipleMainProcedures { span: Span },
    #[error("`main` must take no parameters and return `()` or an integer type.")]
    MainBadSignature { span: Span },

    #[error(
        "Internal compiler error: {0}\nPlease file an issue on the repository and include the \
         code that triggered this error."
    )]
    Internal(&'static str, Span),
}

impl CompileError {
    pub fn to_friendly_error_string(&self) -> String {
        self.to_string()
    }

    pub fn span(&self) -> Option<Span> {
        use CompileError::*;
        match self {
            UnknownName { span, .. }
            | NotAValue { span, .. }
            | UnknownTypePath { span, .. }
            | ModuleNotFound { span, .. }
            | DuplicateIntroduction { span, .. }
            | ShadowRequiresKeyword { span, .. }
            | ShadowTargetMissing { span, .. }
            | ReservedName { span, .. }
            | NotVisible { span, .. }
            | SuperclassUndefined { span, .. }
            | UnknownPrimitive { span, .. }
            | UnionTooFewMembers { span }
            | TypeArityMismatch { span, .. }
            | UnknownModalState { span, .. }
            | SharedPermUnsupported { span }
            | ConstLenInvalid { span }
            | AliasCycle { span, .. }
            | GenericBoundUnsatisfied { span, .. }
            | TypeMismatch { span, .. }
            | SubsumptionModalNonNiche { span, .. }
            | NullLiteralNeedsContext { span }
            | IntLiteralOutOfRange { span, .. }
            | RecordDefaultInit { span, .. }
            | UnknownField { span, .. }
            | FieldNotVisible { span, .. }
            | UnionDirectAccess { span }
            | ModalFieldNeedsState { span, .. }
            | TupleIndexOutOfBounds { span, .. }
            | TupleIndexNotConst { span }
            | ArrayIndexOutOfBounds { span, .. }
            | ArrayIndexNotConst { span }
            | IndexSliceDirect { span }
            | IndexBaseNotIndexable { span, .. }
            | CalleeNotFunction { span, .. }
            | ArgCountMismatch { span, .. }
            | CallMoveMissing { span }
            | CallMoveUnexpected { span }
            | CallArgNotPlace { span }
            | CallArgType { span, .. }
            | UnknownMethod { span, .. }
            | AmbiguousMethod { span, .. }
            | AddressOfNonPlace { span }
            | DerefNonPtr { span, .. }
            | DerefInvalidState { span, .. }
            | RawDerefOutsideUnsafe { span }
            | TransmuteOutsideUnsafe { span }
            | TransmuteNonBitcopy { span, .. }
            | CastInvalid { span, .. }
            | MoveNonPlace { span }
            | UnknownRegion { span, .. }
            | AllocOutsideRegion { span }
            | AssignImmutable { span, .. }
            | AssignConst { span }
            | LetRefutablePattern { span }
            | BreakOutsideLoop { span }
            | ContinueOutsideLoop { span }
            | DeferNonUnit { span }
            | DeferNonLocalExit { span }
            | FrameWithoutRegion { span }
            | StaticAssertNotConst { span }
            | StaticAssertFailed { span }
            | ResultOutsideParallel { span }
            | BinaryOpUndefined { span, .. }
            | PatternTupleArity { span, .. }
            | PatternDupField { span, .. }
            | PatternUnknownField { span, .. }
            | PatternShape { span, .. }
            | RangePatternEmpty { span }
            | RangePatternNotConst { span }
            | MatchArmTypeMismatch { span, .. }
            | MatchEnumNonExhaustive { span, .. }
            | MatchModalNonExhaustive { span, .. }
            | MatchUnionNonExhaustive { span, .. }
            | MatchNoIrrefutableArm { span }
            | RecordDupField { span, .. }
            | EnumDupVariant { span, .. }
            | ModalDupState { span, .. }
            | ImplIncomplete { span, .. }
            | OrphanImpl { span, .. }
            | LinearizationFailed { span, .. }
            | PlaceMoved { span, .. }
            | PlacePartiallyMoved { span, .. }
            | PlaceUniqueInactive { span }
            | MoveImmovable { span, .. }
            | MoveAlreadyMoved { span, .. }
            | MoveFieldAlreadyMoved { span, .. }
            | MoveFieldNonUnique { span, .. }
            | ArgPassMoveMissing { span }
            | BindJoinMismatch { span }
            | LoopFixpointOverflow { span }
            | ParallelDomainNotExecutionDomain { span, .. }
            | SpawnOutsideParallel { span }
            | DispatchOutsideParallel { span }
            | WaitNotSpawned { span, .. }
            | WaitWhileKeysHeld { span }
            | DispatchRangeExpected { span, .. }
            | DispatchReduceShape { span }
            | UseAfterMoveAcrossSpawn { span, .. }
            | VarCaptureWithoutShared { span, .. }
            | UniqueCaptureNotMoved { span, .. }
            | GpuSharedCapture { span }
            | GpuHostPointerCapture { span }
            | GpuNestedParallel { span }
            | GpuHeapAlloc { span }
            | YieldOutsideAsync { span }
            | YieldTypeMismatch { span, .. }
            | YieldFromNotAsync { span, .. }
            | SyncNotAsync { span, .. }
            | SyncInAsyncContext { span }
            | RaceArmNotAsync { span, .. }
            | AllElemNotAsync { span, .. }
            | PropagateShape { span, .. }
            | PropagateReturnMismatch { span, .. }
            | UnknownAttribute { span, .. }
            | AttributeWrongTarget { span, .. }
            | MultipleMainProcedures { span }
            | MainBadSignature { span }
            | Internal(_, span) => Some(span.clone()),
            InitCycle { .. } | NoMainProcedure => None,
        }
    }

    /// The stable diagnostic code for this error. Structural typing rules use
    /// their rule ids; concurrency, module, project, init and attribute rules
    /// use `E-{AREA}-NNNN` codes.
    pub fn code(&self) -> &'static str {
        use CompileError::*;
        match self {
            UnknownName { .. } => "ResolveExpr-Ident-Err",
            NotAValue { .. } => "ResolveExpr-Kind-Err",
            UnknownTypePath { .. } => "TypeWF-Path-Err",
            ModuleNotFound { .. } => "Resolve-Module-Err",
            DuplicateIntroduction { .. } => "Intro-Dup",
            ShadowRequiresKeyword { .. } => "Intro-Shadow-Required",
            ShadowTargetMissing { .. } => "Shadow-Missing-Err",
            ReservedName { .. } => "Intro-Reserved-Err",
            NotVisible { .. } => "Vis-Access-Err",
            SuperclassUndefined { .. } => "Superclass-Undefined",
            UnknownPrimitive { .. } => "TypeWF-Prim-Err",
            UnionTooFewMembers { .. } => "TypeWF-Union-Err",
            TypeArityMismatch { .. } => "TypeWF-Arity-Err",
            UnknownModalState { .. } => "TypeWF-ModalState-Err",
            SharedPermUnsupported { .. } => "Perm-Shared-Unsupported",
            ConstLenInvalid { .. } => "ConstLen-Err",
            AliasCycle { .. } => "TypeWF-Alias-Cycle-Err",
            GenericBoundUnsatisfied { .. } => "Generic-Bound-Err",
            TypeMismatch { .. } => "Chk-Type-Err",
            SubsumptionModalNonNiche { .. } => "Chk-Subsumption-Modal-NonNiche",
            NullLiteralNeedsContext { .. } => "NullLiteral-Infer-Err",
            IntLiteralOutOfRange { .. } => "IntLiteral-Range-Err",
            RecordDefaultInit { .. } => "Record-Default-Init-Err",
            UnknownField { .. } => "Field-Unknown-Err",
            FieldNotVisible { .. } => "Field-Vis-Err",
            UnionDirectAccess { .. } => "Union-DirectAccess-Err",
            ModalFieldNeedsState { .. } => "Modal-Field-State-Err",
            TupleIndexOutOfBounds { .. } => "TupleIndex-OOB",
            TupleIndexNotConst { .. } => "TupleIndex-NonConst",
            ArrayIndexOutOfBounds { .. } => "Index-Array-OOB",
            ArrayIndexNotConst { .. } => "Index-Array-NonConst",
            IndexSliceDirect { .. } => "Index-Slice-Direct-Err",
            IndexBaseNotIndexable { .. } => "Index-Base-Err",
            CalleeNotFunction { .. } => "Call-Callee-NotFunc",
            ArgCountMismatch { .. } => "Call-ArgCount-Err",
            CallMoveMissing { .. } => "Call-Move-Missing",
            CallMoveUnexpected { .. } => "Call-Move-Unexpected",
            CallArgNotPlace { .. } => "Call-Arg-NotPlace",
            CallArgType { .. } => "Call-ArgType-Err",
            UnknownMethod { .. } => "Method-Unknown-Err",
            AmbiguousMethod { .. } => "Method-Ambiguous-Err",
            AddressOfNonPlace { .. } => "AddrOf-NonPlace-Err",
            DerefNonPtr { .. } => "Deref-NonPtr-Err",
            DerefInvalidState { .. } => "Deref-State-Err",
            RawDerefOutsideUnsafe { .. } => "Deref-Raw-Unsafe-Err",
            TransmuteOutsideUnsafe { .. } => "Transmute-Unsafe-Err",
            TransmuteNonBitcopy { .. } => "Transmute-Bitcopy-Err",
            CastInvalid { .. } => "Cast-Invalid-Err",
            MoveNonPlace { .. } => "Move-NonPlace-Err",
            UnknownRegion { .. } => "Region-Unknown-Err",
            AllocOutsideRegion { .. } => "Alloc-NoRegion-Err",
            AssignImmutable { .. } => "Assign-Immutable-Err",
            AssignConst { .. } => "Assign-Const-Err",
            LetRefutablePattern { .. } => "Let-Refutable-Pattern-Err",
            BreakOutsideLoop { .. } => "Break-Outside-Loop-Err",
            ContinueOutsideLoop { .. } => "Continue-Outside-Loop-Err",
            DeferNonUnit { .. } => "Defer-NonUnit-Err",
            DeferNonLocalExit { .. } => "Defer-Transfer-Err",
            FrameWithoutRegion { .. } => "Frame-NoRegion-Err",
            StaticAssertNotConst { .. } => "StaticAssert-NonConst-Err",
            StaticAssertFailed { .. } => "StaticAssert-False-Err",
            ResultOutsideParallel { .. } => "Result-Outside-Parallel-Err",
            BinaryOpUndefined { .. } => "BinOp-Undefined-Err",
            PatternTupleArity { .. } => "Pat-Tuple-Arity-Err",
            PatternDupField { .. } => "Pat-Dup-R-Err",
            PatternUnknownField { .. } => "Pat-Field-Unknown-Err",
            PatternShape { .. } => "Pat-Shape-Err",
            RangePatternEmpty { .. } => "RangePattern-Empty",
            RangePatternNotConst { .. } => "RangePattern-NonConst",
            MatchArmTypeMismatch { .. } => "Match-All-Eq-Err",
            MatchEnumNonExhaustive { .. } => "Match-Enum-NonExhaustive",
            MatchModalNonExhaustive { .. } => "Match-Modal-NonExhaustive",
            MatchUnionNonExhaustive { .. } => "Match-Union-NonExhaustive",
            MatchNoIrrefutableArm { .. } => "Match-NoIrrefutable-Err",
            RecordDupField { .. } => "WF-Record-DupField",
            EnumDupVariant { .. } => "WF-Enum-DupVariant",
            ModalDupState { .. } => "WF-Modal-DupState",
            ImplIncomplete { .. } => "Impl-Incomplete-Err",
            OrphanImpl { .. } => "Impl-Orphan-Err",
            LinearizationFailed { .. } => "Class-Linearize-Err",
            PlaceMoved { .. } => "B-Place-Moved-Err",
            PlacePartiallyMoved { .. } => "B-Place-PartialMoved-Err",
            PlaceUniqueInactive { .. } => "B-Place-Unique-Err",
            MoveImmovable { .. } => "B-Move-Whole-Immovable-Err",
            MoveAlreadyMoved { .. } => "B-Move-Whole-Moved-Err",
            MoveFieldAlreadyMoved { .. } => "B-Move-Field-Moved-Err",
            MoveFieldNonUnique { .. } => "B-Move-Field-NonUnique-Err",
            ArgPassMoveMissing { .. } => "B-ArgPass-Move-Missing",
            BindJoinMismatch { .. } => "B-Join-Err",
            LoopFixpointOverflow { .. } => "B-LoopFix-Err",
            ParallelDomainNotExecutionDomain { .. } => "E-CON-0101",
            SpawnOutsideParallel { .. } => "E-CON-0110",
            DispatchOutsideParallel { .. } => "E-CON-0111",
            WaitNotSpawned { .. } => "E-CON-0120",
            WaitWhileKeysHeld { .. } => "E-CON-0121",
            UseAfterMoveAcrossSpawn { .. } => "E-CON-0122",
            VarCaptureWithoutShared { .. } => "E-CON-0131",
            UniqueCaptureNotMoved { .. } => "E-CON-0132",
            DispatchRangeExpected { .. } => "E-CON-0140",
            DispatchReduceShape { .. } => "E-CON-0141",
            GpuSharedCapture { .. } => "E-CON-0150",
            GpuHostPointerCapture { .. } => "E-CON-0151",
            GpuNestedParallel { .. } => "E-CON-0152",
            GpuHeapAlloc { .. } => "E-CON-0153",
            YieldOutsideAsync { .. } => "E-CON-0201",
            YieldTypeMismatch { .. } => "E-CON-0202",
            YieldFromNotAsync { .. } => "E-CON-0203",
            SyncNotAsync { .. } => "E-CON-0210",
            SyncInAsyncContext { .. } => "E-CON-0211",
            RaceArmNotAsync { .. } => "E-CON-0220",
            AllElemNotAsync { .. } => "E-CON-0221",
            PropagateShape { .. } => "Propagate-Shape-Err",
            PropagateReturnMismatch { .. } => "Propagate-Return-Err",
            UnknownAttribute { .. } => "E-ATTR-0001",
            AttributeWrongTarget { .. } => "E-ATTR-0002",
            InitCycle { .. } => "E-MOD-1401",
            NoMainProcedure => "E-PRJ-0301",
            MultipleMainProcedures { .. } => "E-PRJ-0302",
            MainBadSignature { .. } => "E-PRJ-0304",
            Internal(..) => "E-ICE-0001",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            code: self.code(),
            severity: Severity::Error,
            span: self.span(),
            message: self.to_friendly_error_string(),
        }
    }
}
