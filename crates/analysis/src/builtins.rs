use rustc_hash::FxHashSet;
use std::sync::LazyLock;

const BUILTIN_NAMES: &[&str] = &[
    // functions
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "breakpoint", "callable", "chr",
    "compile", "delattr", "dir", "divmod", "enumerate", "eval", "exec", "filter", "format",
    "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input", "isinstance",
    "issubclass", "iter", "len", "locals", "map", "max", "min", "next", "oct", "open", "ord",
    "pow", "print", "repr", "reversed", "round", "setattr", "sorted", "sum", "vars", "zip",
    "__import__",
    // types
    "bool", "bytearray", "bytes", "classmethod", "complex", "dict", "float", "frozenset", "int",
    "list", "memoryview", "object", "property", "range", "set", "slice", "staticmethod", "str",
    "super", "tuple", "type",
    // constants
    "True", "False", "None", "Ellipsis", "NotImplemented", "__debug__",
    // module attributes
    "__name__", "__file__", "__doc__", "__package__", "__spec__", "__loader__", "__builtins__",
    "__annotations__", "__dict__", "__class__",
    // exceptions
    "BaseException", "BaseExceptionGroup", "Exception", "ExceptionGroup", "ArithmeticError",
    "AssertionError", "AttributeError", "BlockingIOError", "BrokenPipeError", "BufferError",
    "ChildProcessError", "ConnectionAbortedError", "ConnectionError", "ConnectionRefusedError",
    "ConnectionResetError", "EOFError", "EnvironmentError", "FileExistsError",
    "FileNotFoundError", "FloatingPointError", "GeneratorExit", "IOError", "ImportError",
    "IndentationError", "IndexError", "InterruptedError", "IsADirectoryError", "KeyError",
    "KeyboardInterrupt", "LookupError", "MemoryError", "ModuleNotFoundError", "NameError",
    "NotADirectoryError", "NotImplementedError", "OSError", "OverflowError", "PermissionError",
    "ProcessLookupError", "RecursionError", "ReferenceError", "RuntimeError",
    "StopAsyncIteration", "StopIteration", "SyntaxError", "SystemError", "SystemExit",
    "TabError", "TimeoutError", "TypeError", "UnboundLocalError", "UnicodeDecodeError",
    "UnicodeEncodeError", "UnicodeError", "UnicodeTranslateError", "ValueError",
    "ZeroDivisionError",
    // warnings
    "BytesWarning", "DeprecationWarning", "FutureWarning", "ImportWarning",
    "PendingDeprecationWarning", "ResourceWarning", "RuntimeWarning", "SyntaxWarning",
    "UnicodeWarning", "UserWarning", "Warning",
];

static BUILTINS: LazyLock<FxHashSet<&'static str>> =
    LazyLock::new(|| BUILTIN_NAMES.iter().copied().collect());

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(name)
}
