//! POSIX permission sets, integer modes and symbolic mode instructions.
//!
//! A symbolic instruction is a comma-separated list of `<who><op><what>`
//! clauses such as `ug+r,o-x`:
//! - `who` is any of `u`, `g`, `o` (empty means all three),
//! - `op` is `+` or `-`,
//! - `what` is a non-empty combination of `r`, `w`, `x`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::conf::{C_PATTERN_PERMISSION_STRING, N_INT_MODE_MAX};
use crate::error::{FsError, FsResult};

static RE_PERMISSION_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(C_PATTERN_PERMISSION_STRING).expect("permission string pattern is valid")
});

////////////////////////////////////////////////////////////////////////////////
// #region PermissionSet

/// One of the nine POSIX permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumPosixPermission {
    OwnerRead,
    OwnerWrite,
    OwnerExecute,
    GroupRead,
    GroupWrite,
    GroupExecute,
    OthersRead,
    OthersWrite,
    OthersExecute,
}

/// All permissions, from the most significant bit (`0o400`) down.
pub const L_POSIX_PERMISSIONS: [EnumPosixPermission; 9] = [
    EnumPosixPermission::OwnerRead,
    EnumPosixPermission::OwnerWrite,
    EnumPosixPermission::OwnerExecute,
    EnumPosixPermission::GroupRead,
    EnumPosixPermission::GroupWrite,
    EnumPosixPermission::GroupExecute,
    EnumPosixPermission::OthersRead,
    EnumPosixPermission::OthersWrite,
    EnumPosixPermission::OthersExecute,
];

impl EnumPosixPermission {
    /// Bit of this permission in an integer mode.
    pub fn bit(self) -> u32 {
        1 << (8 - self as u32)
    }

    fn symbol(self) -> char {
        match self {
            Self::OwnerRead | Self::GroupRead | Self::OthersRead => 'r',
            Self::OwnerWrite | Self::GroupWrite | Self::OthersWrite => 'w',
            Self::OwnerExecute | Self::GroupExecute | Self::OthersExecute => 'x',
        }
    }
}

/// Subset of the nine POSIX permission bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PermissionSet {
    n_bits: u16,
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `rwxrwxrwx`.
    pub fn all() -> Self {
        Self {
            n_bits: N_INT_MODE_MAX as u16,
        }
    }

    /// Decode an integer mode; anything outside `0..=0o777` is rejected.
    pub fn from_int_mode(mode: u32) -> FsResult<Self> {
        if mode & N_INT_MODE_MAX != mode {
            return Err(FsError::InvalidIntMode(mode));
        }
        Ok(Self {
            n_bits: mode as u16,
        })
    }

    /// Keep the permission bits of a native mode, dropping file type and
    /// setuid/setgid/sticky bits.
    pub fn from_native_mode(mode: u32) -> Self {
        Self {
            n_bits: (mode & N_INT_MODE_MAX) as u16,
        }
    }

    /// Parse a `rwxr-x---` string.
    pub fn from_permission_string(value: &str) -> FsResult<Self> {
        if !RE_PERMISSION_STRING.is_match(value) {
            return Err(FsError::InvalidPermissionString(value.to_string()));
        }
        Ok(value
            .chars()
            .zip(L_POSIX_PERMISSIONS)
            .filter(|(c, _)| *c != '-')
            .map(|(_, perm)| perm)
            .collect())
    }

    pub fn to_int_mode(self) -> u32 {
        u32::from(self.n_bits)
    }

    pub fn contains(self, perm: EnumPosixPermission) -> bool {
        u32::from(self.n_bits) & perm.bit() != 0
    }

    pub fn insert(&mut self, perm: EnumPosixPermission) {
        self.n_bits |= perm.bit() as u16;
    }

    pub fn remove(&mut self, perm: EnumPosixPermission) {
        self.n_bits &= !(perm.bit() as u16);
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            n_bits: self.n_bits | other.n_bits,
        }
    }

    pub fn difference(self, other: Self) -> Self {
        Self {
            n_bits: self.n_bits & !other.n_bits,
        }
    }

    pub fn is_empty(self) -> bool {
        self.n_bits == 0
    }

    pub fn len(self) -> usize {
        self.n_bits.count_ones() as usize
    }

    /// Members in `L_POSIX_PERMISSIONS` order.
    pub fn iter(self) -> impl Iterator<Item = EnumPosixPermission> {
        L_POSIX_PERMISSIONS
            .into_iter()
            .filter(move |perm| self.contains(*perm))
    }
}

impl FromIterator<EnumPosixPermission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = EnumPosixPermission>>(iter: T) -> Self {
        let mut set_perms = Self::empty();
        for perm in iter {
            set_perms.insert(perm);
        }
        set_perms
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for perm in L_POSIX_PERMISSIONS {
            let c = if self.contains(perm) { perm.symbol() } else { '-' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermissionSet({self})")
    }
}

/// Integer mode to permission set.
pub fn int_mode_to_posix(mode: u32) -> FsResult<PermissionSet> {
    PermissionSet::from_int_mode(mode)
}

/// Permission set to integer mode.
pub fn posix_to_int_mode(set_perms: PermissionSet) -> u32 {
    set_perms.to_int_mode()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ModeInstructions

/// Permissions to add and to remove, built from symbolic instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecModeChange {
    pub perms_to_add: PermissionSet,
    pub perms_to_remove: PermissionSet,
}

impl SpecModeChange {
    /// Apply to existing permissions: additions first, then removals.
    pub fn modify(&self, perms_current: PermissionSet) -> PermissionSet {
        perms_current
            .union(self.perms_to_add)
            .difference(self.perms_to_remove)
    }
}

/// Parse comma-separated instructions into a [`SpecModeChange`].
pub fn build_mode_change(instructions: &str) -> FsResult<SpecModeChange> {
    let mut perms_to_add = PermissionSet::empty();
    let mut perms_to_remove = PermissionSet::empty();
    parse_mode_instructions(instructions, &mut perms_to_add, &mut perms_to_remove)?;
    Ok(SpecModeChange {
        perms_to_add,
        perms_to_remove,
    })
}

/// Parse comma-separated instructions, accumulating into the two sets.
///
/// Trailing empty clauses are ignored; any other empty clause is invalid.
pub fn parse_mode_instructions(
    instructions: &str,
    perms_to_add: &mut PermissionSet,
    perms_to_remove: &mut PermissionSet,
) -> FsResult<()> {
    let mut l_clauses = instructions.split(',').collect::<Vec<_>>();
    while l_clauses.len() > 1 && l_clauses.last() == Some(&"") {
        l_clauses.pop();
    }
    for clause in l_clauses {
        parse_mode_instruction(clause, perms_to_add, perms_to_remove)?;
    }
    Ok(())
}

/// Parse one `<who><op><what>` clause.
pub fn parse_mode_instruction(
    instruction: &str,
    perms_to_add: &mut PermissionSet,
    perms_to_remove: &mut PermissionSet,
) -> FsResult<()> {
    let invalid = || FsError::InvalidModeInstruction(instruction.to_string());

    let (n_op, if_add) = match (instruction.find('+'), instruction.find('-')) {
        (Some(n), _) => (n, true),
        (None, Some(n)) => (n, false),
        (None, None) => return Err(invalid()),
    };
    let c_who = match &instruction[..n_op] {
        "" => "ugo",
        other => other,
    };
    let c_what = &instruction[n_op + 1..];
    if c_what.is_empty() {
        return Err(invalid());
    }

    let mut l_who_offsets = Vec::with_capacity(3);
    for c in c_who.chars() {
        match c {
            'u' => l_who_offsets.push(0),
            'g' => l_who_offsets.push(3),
            'o' => l_who_offsets.push(6),
            'a' => return Err(FsError::UnsupportedOperation(instruction.to_string())),
            _ => return Err(invalid()),
        }
    }

    let mut l_what_offsets = Vec::with_capacity(3);
    for c in c_what.chars() {
        match c {
            'r' => l_what_offsets.push(0),
            'w' => l_what_offsets.push(1),
            'x' => l_what_offsets.push(2),
            'X' => return Err(FsError::UnsupportedOperation(instruction.to_string())),
            _ => return Err(invalid()),
        }
    }

    let perms_target = if if_add { perms_to_add } else { perms_to_remove };
    for n_who in &l_who_offsets {
        for n_what in &l_what_offsets {
            perms_target.insert(L_POSIX_PERMISSIONS[n_who + n_what]);
        }
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
