// src/workflow/dirs.rs

//! Working directory layout.
//!
//! ```text
//! <work_root>/<YYYYMMDD>/<HHMM>/ungrib<n>          shared by all domains
//! <work_root>/<YYYYMMDD>/<HHMM>/<domain>/real<n>   one per program
//! <work_root>/<YYYYMMDD>/<HHMM>/<domain>/wrf<n>_3  ensemble member 3
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use super::shape::CaseShape;

/// Directory of one case (domain at a start time).
pub fn case_dir(work_root: &Path, start: NaiveDateTime, domain: &str) -> PathBuf {
    work_root
        .join(start.format("%Y%m%d").to_string())
        .join(start.format("%H%M").to_string())
        .join(domain)
}

/// Working directory of `program` in a case; ensemble members append `_<i>`.
pub fn work_dir(case_dir: &Path, program: &str, case_number: u32) -> PathBuf {
    let name = format!("{program}{}", CaseShape::dir_index(case_number));
    if program == "ungrib" {
        if let Some(parent) = case_dir.parent() {
            return parent.join(name);
        }
    }
    case_dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap()
    }

    #[test]
    fn case_and_program_directories() {
        let case = case_dir(Path::new("/scratch/run"), start(), "d01");
        assert_eq!(case, PathBuf::from("/scratch/run/20240501/1830/d01"));
        assert_eq!(
            work_dir(&case, "real", 3),
            PathBuf::from("/scratch/run/20240501/1830/d01/real3")
        );
        assert_eq!(
            work_dir(&case, "wrf", 7),
            PathBuf::from("/scratch/run/20240501/1830/d01/wrf5")
        );
    }

    #[test]
    fn ungrib_is_shared_between_domains() {
        let case = case_dir(Path::new("/scratch/run"), start(), "d02");
        assert_eq!(
            work_dir(&case, "ungrib", 1),
            PathBuf::from("/scratch/run/20240501/1830/ungrib1")
        );
    }
}
