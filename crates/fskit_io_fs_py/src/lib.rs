use std::path::Path;

use fskit_io_fs::host::from_native_path;
use fskit_io_fs::{
    EnumCopyOption, EnumRecursionMode, FsError, FsPath, FsResult, files, probe_content_type,
};
use pyo3::create_exception;
use pyo3::exceptions::{
    PyFileExistsError, PyFileNotFoundError, PyIsADirectoryError, PyNotADirectoryError,
    PyNotImplementedError, PyOSError, PyPermissionError, PyValueError,
};
use pyo3::prelude::*;

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "fskit.fs.recursive.v1";
const C_BRIDGE_TRANSPORT: &str = "rust_native";

create_exception!(
    _fskit_io_fs_rs,
    RecursiveOperationError,
    PyOSError,
    "Keep-going traversal finished with one or more errors."
);

fn parse_rule_recursion(value: &str) -> PyResult<EnumRecursionMode> {
    match value {
        "fail_fast" => Ok(EnumRecursionMode::FailFast),
        "keep_going" => Ok(EnumRecursionMode::KeepGoing),
        _ => Err(PyValueError::new_err(format!(
            "Invalid recursion mode: `{value}`. Expected one of: ['fail_fast', 'keep_going']"
        ))),
    }
}

fn map_fs_error(exception: FsError) -> PyErr {
    let message = exception.to_string();
    match exception {
        FsError::NoSuchFile(_) => PyFileNotFoundError::new_err(message),
        FsError::FileAlreadyExists(_) | FsError::DirectoryNotEmpty(_) => {
            PyFileExistsError::new_err(message)
        }
        FsError::AccessDenied(_) | FsError::ReadOnlyFileSystem(_) => {
            PyPermissionError::new_err(message)
        }
        FsError::NotDirectory(_) => PyNotADirectoryError::new_err(message),
        FsError::IsDirectory(_) => PyIsADirectoryError::new_err(message),
        FsError::UnresolvablePath(_)
        | FsError::InvalidPath { .. }
        | FsError::InvalidIntMode(_)
        | FsError::InvalidModeInstruction(_)
        | FsError::InvalidPermissionString(_)
        | FsError::InvalidPattern { .. }
        | FsError::InvalidAttribute(_) => PyValueError::new_err(message),
        FsError::UnsupportedOperation(_) => PyNotImplementedError::new_err(message),
        FsError::Recursive(agg) => {
            let l_messages = agg
                .errors()
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>();
            RecursiveOperationError::new_err((message, l_messages))
        }
        _ => PyOSError::new_err(message),
    }
}

fn host_path(value: &str) -> FsResult<FsPath> {
    from_native_path(Path::new(value))
}

#[pyfunction(name = "copy_recursive")]
#[pyo3(signature = (
    source,
    destination,
    rule_recursion = "fail_fast",
    if_replace_existing = false
))]
fn copy_recursive_py(
    py: Python<'_>,
    source: String,
    destination: String,
    rule_recursion: &str,
    if_replace_existing: bool,
) -> PyResult<()> {
    let rule_recursion = parse_rule_recursion(rule_recursion)?;
    let l_options = if if_replace_existing {
        vec![EnumCopyOption::ReplaceExisting]
    } else {
        Vec::new()
    };
    py.allow_threads(|| {
        let path_src = host_path(&source)?;
        let path_dst = host_path(&destination)?;
        fskit_io_fs::copy_recursive(&path_src, &path_dst, rule_recursion, &l_options)
    })
    .map_err(map_fs_error)
}

#[pyfunction(name = "delete_recursive")]
#[pyo3(signature = (victim, rule_recursion = "fail_fast"))]
fn delete_recursive_py(py: Python<'_>, victim: String, rule_recursion: &str) -> PyResult<()> {
    let rule_recursion = parse_rule_recursion(rule_recursion)?;
    py.allow_threads(|| {
        let path_victim = host_path(&victim)?;
        fskit_io_fs::delete_recursive(&path_victim, rule_recursion)
    })
    .map_err(map_fs_error)
}

#[pyfunction(name = "change_mode")]
#[pyo3(signature = (path, instructions))]
fn change_mode_py(py: Python<'_>, path: String, instructions: String) -> PyResult<()> {
    py.allow_threads(|| files::change_mode(&host_path(&path)?, &instructions))
        .map_err(map_fs_error)
}

#[pyfunction(name = "set_mode")]
#[pyo3(signature = (path, mode))]
fn set_mode_py(py: Python<'_>, path: String, mode: u32) -> PyResult<()> {
    py.allow_threads(|| files::set_mode(&host_path(&path)?, mode))
        .map_err(map_fs_error)
}

#[pyfunction(name = "probe_content_type")]
#[pyo3(signature = (path))]
fn probe_content_type_py(py: Python<'_>, path: String) -> PyResult<Option<String>> {
    py.allow_threads(|| probe_content_type(&host_path(&path)?))
        .map_err(map_fs_error)
}

#[pymodule]
fn _fskit_io_fs_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_function(wrap_pyfunction!(copy_recursive_py, module)?)?;
    module.add_function(wrap_pyfunction!(delete_recursive_py, module)?)?;
    module.add_function(wrap_pyfunction!(change_mode_py, module)?)?;
    module.add_function(wrap_pyfunction!(set_mode_py, module)?)?;
    module.add_function(wrap_pyfunction!(probe_content_type_py, module)?)?;
    module.add(
        "RecursiveOperationError",
        module.py().get_type::<RecursiveOperationError>(),
    )?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
