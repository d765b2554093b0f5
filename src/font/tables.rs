//! Known-good font locations, keyed by `std::env::consts::OS`.

/// Candidate fonts for one platform.
#[derive(Debug)]
pub(crate) struct PlatformFonts {
    /// Environment variable (and its default) that font `files` are relative to.
    pub root_env: Option<(&'static str, &'static str)>,
    /// Font files, tried in order as filesystem paths.
    pub files: &'static [&'static str],
    /// Directories searched (recursively) when none of `files` loads.
    pub search_dirs: &'static [&'static str],
    /// File names looked for in `search_dirs`, in order of preference.
    pub file_names: &'static [&'static str],
}

const WINDOWS: PlatformFonts = PlatformFonts {
    root_env: Some(("WINDIR", r"C:\Windows")),
    files: &[
        r"Fonts\simhei.ttf",
        r"Fonts\msyh.ttc",
        r"Fonts\simsun.ttc",
        r"Fonts\simkai.ttf",
        r"Fonts\arial.ttf",
    ],
    search_dirs: &["Fonts"],
    file_names: &["simhei.ttf", "msyh.ttc", "msyh.ttf", "simsun.ttc", "arialuni.ttf", "arial.ttf"],
};

const MACOS: PlatformFonts = PlatformFonts {
    root_env: None,
    files: &[
        "/System/Library/Fonts/PingFang.ttc",
        "/System/Library/Fonts/STHeiti Medium.ttc",
        "/Library/Fonts/Arial Unicode.ttf",
        "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
        "/System/Library/Fonts/Helvetica.ttc",
    ],
    search_dirs: &["/System/Library/Fonts", "/Library/Fonts"],
    file_names: &["Arial Unicode.ttf", "PingFang.ttc", "STHeiti Light.ttc", "Arial.ttf", "Helvetica.ttc"],
};

const LINUX: PlatformFonts = PlatformFonts {
    root_env: None,
    files: &[
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        "/usr/share/fonts/wenquanyi/wqy-microhei/wqy-microhei.ttc",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    ],
    search_dirs: &["/usr/share/fonts", "/usr/local/share/fonts"],
    file_names: &[
        "NotoSansCJK-Regular.ttc",
        "NotoSansCJKsc-Regular.otf",
        "wqy-microhei.ttc",
        "wqy-zenhei.ttc",
        "DejaVuSans.ttf",
        "LiberationSans-Regular.ttf",
    ],
};

const FONT_TABLES: &[(&str, &PlatformFonts)] =
    &[("windows", &WINDOWS), ("macos", &MACOS), ("linux", &LINUX)];

/// The table for `os`, defaulting to the Linux table for other unixes.
pub(crate) fn table_for(os: &str) -> &'static PlatformFonts {
    FONT_TABLES
        .iter()
        .find(|(name, _)| *name == os)
        .map(|(_, table)| *table)
        .unwrap_or(&LINUX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_platform_has_candidates() {
        for os in ["windows", "macos", "linux", "freebsd"] {
            let table = table_for(os);
            assert!(!table.files.is_empty(), "{os} has no font files");
            assert!(!table.search_dirs.is_empty(), "{os} has no font directories");
            assert!(!table.file_names.is_empty(), "{os} has no font names");
        }
    }

    #[test]
    fn windows_paths_are_rooted_in_windir() {
        assert_eq!(table_for("windows").root_env.map(|(var, _)| var), Some("WINDIR"));
        assert!(table_for("linux").root_env.is_none());
    }
}
