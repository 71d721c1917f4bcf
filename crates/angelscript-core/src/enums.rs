//! Enumerations and flag sets shared by the Rust API and the C surface.
//!
//! Every enum here has a fixed integer representation matching the values
//! hosts expect from AngelScript, so the FFI layer can convert with
//! `TryFrom<i32>`/`TryFrom<u32>` and `Into`.

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Result codes returned by engine, module and context operations.
///
/// Zero means success; every failure is negative. On the Rust side failures
/// surface as [`ScriptError::AngelScript`](crate::ScriptError::AngelScript),
/// on the C side as the raw `i32`.
///
/// ```
/// use angelscript_core::{ReturnCode, ScriptError};
///
/// match ScriptError::from_code(-5) {
///     Err(ScriptError::AngelScript(ReturnCode::InvalidArg)) => {}
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum ReturnCode {
    /// Operation completed successfully.
    Success = 0,
    /// Generic failure, also used for failed builds.
    Error = -1,
    /// The context is executing and cannot be modified.
    ContextActive = -2,
    /// The context has not finished executing.
    ContextNotFinished = -3,
    /// The context has not been prepared.
    ContextNotPrepared = -4,
    /// An argument was null, out of range or otherwise unusable.
    InvalidArg = -5,
    /// The requested function does not exist or has no code.
    NoFunction = -6,
    /// The operation is not supported by this runtime.
    NotSupported = -7,
    /// A name contains invalid characters or is a reserved word.
    InvalidName = -8,
    /// The name is already used by another entity.
    NameTaken = -9,
    /// A declaration string could not be parsed.
    InvalidDeclaration = -10,
    /// The object is not valid for this operation.
    InvalidObject = -11,
    /// The type is wrong for this operation.
    InvalidType = -12,
    /// The entity is already registered.
    AlreadyRegistered = -13,
    /// More than one function matches.
    MultipleFunctions = -14,
    /// The module does not exist.
    NoModule = -15,
    /// The global variable does not exist.
    NoGlobalVar = -16,
    /// The engine configuration is invalid.
    InvalidConfiguration = -17,
    /// The interface or signature does not match.
    InvalidInterface = -18,
    /// Not all imported functions could be bound.
    CantBindAllFunctions = -19,
    /// A lower array dimension has not been registered.
    LowerArrayDimensionNotRegistered = -20,
    /// A registration referenced a different configuration group.
    WrongConfigGroup = -21,
    /// The configuration group is used by a built module.
    ConfigGroupIsInUse = -22,
    /// The behaviour cannot be registered for this type.
    IllegalBehaviourForType = -23,
    /// The calling convention is not accepted.
    WrongCallingConv = -24,
    /// A build is already in progress.
    BuildInProgress = -25,
    /// Initialization of global variables raised an exception.
    InitGlobalVarsFailed = -26,
    /// Allocation failed.
    OutOfMemory = -27,
    /// The module is referenced by a running context.
    ModuleIsInUse = -28,
}

impl ReturnCode {
    /// Raw value as it crosses the C boundary.
    #[inline]
    pub fn code(self) -> i32 {
        self.into()
    }

    /// `true` for [`ReturnCode::Success`].
    #[inline]
    pub fn is_success(self) -> bool {
        self == ReturnCode::Success
    }
}

/// Engine configuration properties.
///
/// Values are read and written as `usize`; boolean properties use 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum EngineProperty {
    AllowUnsafeReferences = 1,
    OptimizeBytecode = 2,
    CopyScriptSections = 3,
    /// Maximum size of the operand stack in values, 0 for no limit.
    MaxStackSize = 4,
    UseCharacterLiterals = 5,
    AllowMultilineStrings = 6,
    AllowImplicitHandleTypes = 7,
    /// Omit suspend points from compiled code.
    BuildWithoutLineCues = 8,
    /// Run global variable initializers as the last step of a build.
    InitGlobalVarsAfterBuild = 9,
    /// Enum values must be qualified with the enum name.
    RequireEnumScope = 10,
    ScriptScanner = 11,
    IncludeJitInstructions = 12,
    StringEncoding = 13,
    PropertyAccessorMode = 14,
    ExpandDefArrayToTmpl = 15,
    /// Run a collection step when a context finishes.
    AutoGarbageCollect = 16,
    /// Reject global variables in scripts.
    DisallowGlobalVars = 17,
    AlwaysImplDefaultConstruct = 18,
    CompilerWarnings = 19,
    DisallowValueAssignForRefType = 20,
    AlterSyntaxNamedArgs = 21,
    /// Integer `/` produces a `double`.
    DisableIntegerDivision = 22,
    DisallowEmptyListElements = 23,
    PrivatePropAsProtected = 24,
    AllowUnicodeIdentifiers = 25,
    HeredocTrimMode = 26,
    /// Maximum depth of nested executions on one thread.
    MaxNestedCalls = 27,
    GenericCallMode = 28,
    InitStackSize = 29,
    InitCallStackSize = 30,
    /// Maximum number of script frames, 0 for no limit.
    MaxCallStackSize = 31,
    IgnoreDuplicateSharedIntf = 32,
    NoDebugOutput = 33,
    DisableScriptClassGc = 34,
    JitInterfaceVersion = 35,
    AlwaysImplDefaultCopy = 36,
    AlwaysImplDefaultCopyConstruct = 37,
    MemberInitMode = 38,
    BoolConversionMode = 39,
    ForeachSupport = 40,
}

impl EngineProperty {
    /// Number of property slots the engine table reserves.
    pub const COUNT: usize = 41;

    /// Value a freshly created engine reports.
    pub fn default_value(self) -> usize {
        match self {
            EngineProperty::OptimizeBytecode
            | EngineProperty::CopyScriptSections
            | EngineProperty::AllowImplicitHandleTypes
            | EngineProperty::InitGlobalVarsAfterBuild
            | EngineProperty::AutoGarbageCollect
            | EngineProperty::CompilerWarnings
            | EngineProperty::ForeachSupport => 1,
            EngineProperty::MaxNestedCalls => 100,
            EngineProperty::InitStackSize => 4096,
            EngineProperty::InitCallStackSize => 10,
            EngineProperty::JitInterfaceVersion => 1,
            _ => 0,
        }
    }
}

/// Calling conventions accepted at registration time.
///
/// Only [`CallingConvention::Generic`] can be bound by this runtime; the
/// others exist so that callers passing them get a precise error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum CallingConvention {
    Cdecl = 0,
    Stdcall = 1,
    ThiscallAsGlobal = 2,
    Thiscall = 3,
    CdeclObjLast = 4,
    CdeclObjFirst = 5,
    Generic = 6,
    ThiscallObjLast = 7,
    ThiscallObjFirst = 8,
}

bitflags! {
    /// Flags describing a registered or script-declared type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectTypeFlags: u32 {
        /// Reference type; instances live on the heap and are handled by reference.
        const REF = 1 << 0;
        /// Value type.
        const VALUE = 1 << 1;
        /// Instances take part in cycle detection.
        const GC = 1 << 2;
        const POD = 1 << 3;
        /// Handles to the type may not be taken.
        const NOHANDLE = 1 << 4;
        const SCOPED = 1 << 5;
        const TEMPLATE = 1 << 6;
        const ASHANDLE = 1 << 7;
        const APP_CLASS = 1 << 8;
        /// Instances are not reference counted by the script.
        const NOCOUNT = 1 << 18;
        const IMPLICIT_HANDLE = 1 << 19;
        /// Declared by a script class.
        const SCRIPT_OBJECT = 1 << 21;
        const SHARED = 1 << 22;
        /// The type cannot be inherited from.
        const NOINHERIT = 1 << 23;
        const FUNCDEF = 1 << 24;
        const LIST_PATTERN = 1 << 25;
        const ENUM = 1 << 26;
        const TEMPLATE_SUBTYPE = 1 << 27;
        const TYPEDEF = 1 << 28;
        const ABSTRACT = 1 << 29;
    }
}

/// Behaviours that can be registered on an object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum Behaviour {
    Construct = 0,
    ListConstruct = 1,
    Destruct = 2,
    /// Creates a new instance of a reference type.
    Factory = 3,
    ListFactory = 4,
    AddRef = 5,
    Release = 6,
    /// Returns the weak-reference flag of an instance.
    GetWeakRefFlag = 7,
    TemplateCallback = 8,
    GetRefCount = 9,
    SetGcFlag = 10,
    GetGcFlag = 11,
    /// Reports every handle an instance holds through `gc_enum_callback`.
    EnumRefs = 12,
    /// Clears every handle an instance holds.
    ReleaseRefs = 13,
}

/// Execution state of a context.
///
/// ```text
/// Uninitialized -> Prepared -> Active <-> Suspended
///                                 |-> Finished | Aborted | Exception
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ContextState {
    /// The prepared function returned normally.
    Finished = 0,
    /// Execution stopped at a safe point and can be resumed.
    Suspended = 1,
    /// Execution was aborted by the host.
    Aborted = 2,
    /// A script exception was not caught.
    Exception = 3,
    /// A function and its arguments are ready.
    Prepared = 4,
    /// Nothing is prepared.
    Uninitialized = 5,
    /// Code is running on this context.
    Active = 6,
    /// Reported for a null context on the C surface.
    Error = 7,
    Deserialization = 8,
}

impl ContextState {
    /// States from which execution can no longer continue without a new `prepare`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ContextState::Finished | ContextState::Aborted | ContextState::Exception
        )
    }
}

/// Severity of a message delivered to the message callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum MessageType {
    Error = 0,
    Warning = 1,
    Information = 2,
}

bitflags! {
    /// Controls what a call to `garbage_collect` does.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GCFlags: u32 {
        /// Run until the requested phases are complete.
        const FULL_CYCLE = 1;
        /// Advance the collector by one step.
        const ONE_STEP = 2;
        /// Destroy objects referenced only by the collector.
        const DESTROY_GARBAGE = 4;
        /// Look for unreachable reference cycles.
        const DETECT_GARBAGE = 8;
    }
}

/// Classification returned by token parsing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum TokenClass {
    Unknown = 0,
    Keyword = 1,
    Value = 2,
    Identifier = 3,
    Comment = 4,
    Whitespace = 5,
}

bitflags! {
    /// Parameter and return modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeModifiers: u32 {
        const INREF = 1;
        const OUTREF = 2;
        const INOUTREF = 3;
        const CONST = 4;
    }
}

/// How `get_module` treats a missing module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum GetModuleFlags {
    /// Return nothing when the module does not exist.
    OnlyIfExists = 0,
    /// Create the module when it does not exist.
    CreateIfNotExists = 1,
    /// Discard any existing module with the name and create a new one.
    AlwaysCreate = 2,
}

bitflags! {
    /// Options for `compile_function`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CompileFlags: u32 {
        /// Keep the compiled function in the module's function table.
        const ADD_TO_MODULE = 1;
    }
}

/// Kind of callable behind a function handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum FunctionType {
    Dummy = -1,
    /// Registered by the host.
    System = 0,
    /// Compiled from script.
    Script = 1,
    /// Interface method without an implementation.
    Interface = 2,
    /// Class method resolved through the object's type.
    Virtual = 3,
    /// Signature of a funcdef.
    Funcdef = 4,
    /// Import bound at runtime to a function from another module.
    Imported = 5,
    /// Method bound to an object.
    Delegate = 6,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_codes_round_trip_through_i32() {
        assert_eq!(ReturnCode::InvalidArg.code(), -5);
        assert_eq!(ReturnCode::try_from(-22), Ok(ReturnCode::ConfigGroupIsInUse));
        assert!(ReturnCode::try_from(-999).is_err());
    }

    #[test]
    fn context_state_values() {
        assert_eq!(u32::from(ContextState::Finished), 0);
        assert_eq!(u32::from(ContextState::Uninitialized), 5);
        assert_eq!(ContextState::try_from(7), Ok(ContextState::Error));
        assert!(ContextState::Exception.is_terminal());
        assert!(!ContextState::Suspended.is_terminal());
    }

    #[test]
    fn engine_property_defaults() {
        assert_eq!(EngineProperty::AutoGarbageCollect.default_value(), 1);
        assert_eq!(EngineProperty::MaxCallStackSize.default_value(), 0);
        assert_eq!(EngineProperty::try_from(31), Ok(EngineProperty::MaxCallStackSize));
    }

    #[test]
    fn gc_flags_compose() {
        let flags = GCFlags::FULL_CYCLE | GCFlags::DETECT_GARBAGE;
        assert_eq!(flags.bits(), 9);
        assert!(!flags.contains(GCFlags::ONE_STEP));
    }
}
