use std::collections::BTreeMap;

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::conf::{C_ATTRIBUTE_VIEW_BASIC, C_ATTRIBUTE_VIEW_POSIX, C_ATTRIBUTE_VIEW_USER};
use crate::error::{FsError, FsResult};
use crate::spec::{AttributeValue, EnumOpenOption, FileAttributes};

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
pub(crate) enum TypePathPattern {
    Glob(GlobMatcher),
    Regex(Regex),
}

/// Compile `glob:<pattern>` or `regex:<pattern>`.
pub(crate) fn compile_path_pattern(syntax_and_pattern: &str) -> FsResult<TypePathPattern> {
    let invalid = |reason: String| FsError::InvalidPattern {
        pattern: syntax_and_pattern.to_string(),
        reason,
    };
    let Some((c_syntax, c_pattern)) = syntax_and_pattern.split_once(':') else {
        return Err(invalid("expected `syntax:pattern`".to_string()));
    };

    match c_syntax.to_ascii_lowercase().as_str() {
        "glob" => {
            let matcher = GlobBuilder::new(c_pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| invalid(e.to_string()))?
                .compile_matcher();
            Ok(TypePathPattern::Glob(matcher))
        }
        "regex" => {
            let regex =
                Regex::new(&format!("^(?:{c_pattern})$")).map_err(|e| invalid(e.to_string()))?;
            Ok(TypePathPattern::Regex(regex))
        }
        other => Err(FsError::UnsupportedOperation(format!(
            "pattern syntax `{other}`"
        ))),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region OpenOptions

/// Flags derived from an open-option list.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SpecOpenFlags {
    pub(crate) if_read: bool,
    pub(crate) if_write: bool,
    pub(crate) if_append: bool,
    pub(crate) if_truncate: bool,
    pub(crate) if_create: bool,
    pub(crate) if_create_new: bool,
    pub(crate) if_nofollow: bool,
}

pub(crate) fn derive_open_flags(options: &[EnumOpenOption]) -> FsResult<SpecOpenFlags> {
    let has = |option: EnumOpenOption| options.contains(&option);
    let if_append = has(EnumOpenOption::Append);
    let if_write = has(EnumOpenOption::Write) || if_append;
    if if_append && has(EnumOpenOption::Read) {
        return Err(FsError::UnsupportedOperation(
            "READ and APPEND cannot be combined".to_string(),
        ));
    }
    if if_append && has(EnumOpenOption::TruncateExisting) {
        return Err(FsError::UnsupportedOperation(
            "APPEND and TRUNCATE_EXISTING cannot be combined".to_string(),
        ));
    }
    // CREATE, CREATE_NEW and TRUNCATE_EXISTING only apply when writing.
    Ok(SpecOpenFlags {
        if_read: has(EnumOpenOption::Read) || !if_write,
        if_write,
        if_append,
        if_truncate: if_write && has(EnumOpenOption::TruncateExisting),
        if_create: if_write && has(EnumOpenOption::Create),
        if_create_new: if_write && has(EnumOpenOption::CreateNew),
        if_nofollow: has(EnumOpenOption::NoFollowLinks),
    })
}

/// Options of an output stream; none means create, truncate and write.
pub(crate) fn derive_output_options(options: &[EnumOpenOption]) -> FsResult<Vec<EnumOpenOption>> {
    if options.contains(&EnumOpenOption::Read) {
        return Err(FsError::UnsupportedOperation(
            "READ not allowed on an output stream".to_string(),
        ));
    }
    if options.is_empty() {
        return Ok(vec![
            EnumOpenOption::Create,
            EnumOpenOption::TruncateExisting,
            EnumOpenOption::Write,
        ]);
    }
    let mut l_options = options.to_vec();
    if !l_options.contains(&EnumOpenOption::Write) && !l_options.contains(&EnumOpenOption::Append)
    {
        l_options.push(EnumOpenOption::Write);
    }
    Ok(l_options)
}

/// Input streams accept no write-related options.
pub(crate) fn check_input_options(options: &[EnumOpenOption]) -> FsResult<()> {
    for option in options {
        if matches!(option, EnumOpenOption::Write | EnumOpenOption::Append) {
            return Err(FsError::UnsupportedOperation(format!(
                "{option:?} not allowed on an input stream"
            )));
        }
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Attributes

/// Split `view:name` into its parts; a bare name belongs to the basic view.
pub(crate) fn split_attribute_name(attribute: &str) -> (&str, &str) {
    attribute
        .split_once(':')
        .unwrap_or((C_ATTRIBUTE_VIEW_BASIC, attribute))
}

fn _derive_basic_map(attrs: &FileAttributes) -> BTreeMap<String, AttributeValue> {
    let mut dict_values = BTreeMap::new();
    dict_values.insert("size".to_string(), AttributeValue::Size(attrs.n_size));
    dict_values.insert(
        "lastModifiedTime".to_string(),
        AttributeValue::Time(attrs.time_modified),
    );
    dict_values.insert(
        "lastAccessTime".to_string(),
        AttributeValue::Time(attrs.time_accessed),
    );
    dict_values.insert(
        "creationTime".to_string(),
        AttributeValue::Time(attrs.time_created),
    );
    dict_values.insert(
        "isRegularFile".to_string(),
        AttributeValue::Bool(attrs.is_regular_file()),
    );
    dict_values.insert(
        "isDirectory".to_string(),
        AttributeValue::Bool(attrs.is_directory()),
    );
    dict_values.insert(
        "isSymbolicLink".to_string(),
        AttributeValue::Bool(attrs.is_symbolic_link()),
    );
    dict_values.insert("isOther".to_string(), AttributeValue::Bool(attrs.is_other()));
    if let Some(n_file_key) = attrs.n_file_key {
        dict_values.insert("fileKey".to_string(), AttributeValue::Size(n_file_key));
    }
    dict_values
}

/// Build the map answering a `view:name1,name2` or `view:*` query.
///
/// `load_user` is only called for the `user` view.
pub(crate) fn derive_attribute_map(
    attrs: &FileAttributes,
    attributes: &str,
    load_user: impl FnOnce() -> FsResult<BTreeMap<String, Vec<u8>>>,
) -> FsResult<BTreeMap<String, AttributeValue>> {
    let (c_view, c_names) = split_attribute_name(attributes);
    let dict_all = match c_view {
        C_ATTRIBUTE_VIEW_BASIC => _derive_basic_map(attrs),
        C_ATTRIBUTE_VIEW_POSIX => {
            let Some(permissions) = attrs.permissions else {
                return Err(FsError::UnsupportedOperation(
                    "attribute view `posix`".to_string(),
                ));
            };
            let mut dict_values = _derive_basic_map(attrs);
            dict_values.insert(
                "permissions".to_string(),
                AttributeValue::Permissions(permissions),
            );
            dict_values
        }
        C_ATTRIBUTE_VIEW_USER => load_user()?
            .into_iter()
            .map(|(name, raw)| (name, AttributeValue::Bytes(raw)))
            .collect(),
        other => {
            return Err(FsError::UnsupportedOperation(format!(
                "attribute view `{other}`"
            )));
        }
    };

    let l_names = c_names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>();
    if l_names.contains(&"*") {
        return Ok(dict_all);
    }
    l_names
        .into_iter()
        .map(|name| match dict_all.get(name) {
            Some(value) => Ok((name.to_string(), value.clone())),
            None => Err(FsError::InvalidAttribute(format!("{c_view}:{name}"))),
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::posix::PermissionSet;
    use crate::spec::EnumFileKind;

    fn sample_attrs() -> FileAttributes {
        FileAttributes {
            enum_kind: EnumFileKind::RegularFile,
            n_size: 3,
            time_modified: SystemTime::UNIX_EPOCH,
            time_accessed: SystemTime::UNIX_EPOCH,
            time_created: SystemTime::UNIX_EPOCH,
            permissions: Some(PermissionSet::from_int_mode(0o640).expect("mode")),
            n_file_key: None,
        }
    }

    #[test]
    fn glob_star_stays_within_one_name() {
        let TypePathPattern::Glob(matcher) = compile_path_pattern("glob:/a/*.txt").expect("glob")
        else {
            panic!("expected glob");
        };
        assert!(matcher.is_match("/a/x.txt"));
        assert!(!matcher.is_match("/a/b/x.txt"));
    }

    #[test]
    fn regex_matches_whole_string() {
        let TypePathPattern::Regex(regex) = compile_path_pattern("regex:.*\\.txt").expect("regex")
        else {
            panic!("expected regex");
        };
        assert!(regex.is_match("/a/x.txt"));
        assert!(!regex.is_match("/a/x.txt.bak"));
    }

    #[test]
    fn bad_patterns_rejected() {
        assert!(matches!(
            compile_path_pattern("nocolon"),
            Err(FsError::InvalidPattern { .. })
        ));
        assert!(matches!(
            compile_path_pattern("regex:("),
            Err(FsError::InvalidPattern { .. })
        ));
        assert!(matches!(
            compile_path_pattern("xpath:a"),
            Err(FsError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn open_flags_default_to_read() {
        let spec_flags = derive_open_flags(&[]).expect("flags");
        assert!(spec_flags.if_read && !spec_flags.if_write);

        let spec_flags = derive_open_flags(&[EnumOpenOption::Create]).expect("flags");
        assert!(!spec_flags.if_create);

        let spec_flags =
            derive_open_flags(&[EnumOpenOption::Append, EnumOpenOption::Create]).expect("flags");
        assert!(spec_flags.if_write && spec_flags.if_create && !spec_flags.if_read);

        assert!(derive_open_flags(&[EnumOpenOption::Append, EnumOpenOption::Read]).is_err());
    }

    #[test]
    fn attribute_queries_select_names() {
        let attrs = sample_attrs();
        let dict_values =
            derive_attribute_map(&attrs, "size,isDirectory", || Ok(BTreeMap::new())).expect("map");
        assert_eq!(dict_values.len(), 2);
        assert_eq!(dict_values["size"], AttributeValue::Size(3));
        assert_eq!(dict_values["isDirectory"], AttributeValue::Bool(false));

        let dict_values =
            derive_attribute_map(&attrs, "posix:*", || Ok(BTreeMap::new())).expect("map");
        assert_eq!(
            dict_values["permissions"],
            AttributeValue::Permissions(PermissionSet::from_int_mode(0o640).expect("mode"))
        );

        let err = derive_attribute_map(&attrs, "basic:nope", || Ok(BTreeMap::new()))
            .expect_err("must fail");
        assert!(matches!(err, FsError::InvalidAttribute(_)));
        let err = derive_attribute_map(&attrs, "dos:*", || Ok(BTreeMap::new()))
            .expect_err("must fail");
        assert!(matches!(err, FsError::UnsupportedOperation(_)));
    }
}
