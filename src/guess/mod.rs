//! Infer which registry packages a project needs from the modules it imports.
//!
//! The guesser is deliberately conservative: when the evidence is ambiguous it
//! declines to guess rather than risk adding the wrong package.

pub mod stdlib;

use std::collections::HashSet;

use crate::imports::ImportScan;
use crate::index::{PackageCandidate, RegistryIndex};
use crate::models::{GuessResult, PkgName};

use stdlib::StdlibModules;

/// Candidates whose top popularity is below this are too obscure to trust.
pub const POPULARITY_FLOOR: u64 = 100;

/// Why a candidate was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessReason {
    OnlyCandidate,
    ExactNameMatch,
    MorePopular,
}

impl std::fmt::Display for GuessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuessReason::OnlyCandidate => write!(f, "only one candidate"),
            GuessReason::ExactNameMatch => write!(f, "exact name match"),
            GuessReason::MorePopular => write!(f, "clearly more popular than the next candidate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guess<'a> {
    pub candidate: &'a PackageCandidate,
    pub reason: GuessReason,
}

/// Everything needed to resolve imports for one ecosystem.
#[derive(Debug)]
pub struct Guesser<'a> {
    pub index: &'a RegistryIndex,
    pub stdlib: StdlibModules,
    pub normalize: fn(&str) -> PkgName,
    /// Required ratio between the top two candidates' per-module popularity.
    pub multiplier: f64,
    /// Treat a module missing from the index as provided by a package of the
    /// same name (true for npm, where import specifiers are package names).
    pub self_named_fallback: bool,
}

impl<'a> Guesser<'a> {
    /// Pick the package that most plausibly provides `module`, or `None`.
    ///
    /// Precedence:
    /// 1. standard-library modules are never guessed;
    /// 2. no candidates, no guess;
    /// 3. a single candidate is taken as is;
    /// 4. a candidate named like the module wins regardless of popularity;
    /// 5. the most popular candidate must reach [`POPULARITY_FLOOR`];
    /// 6. its popularity per declared module must be at least `multiplier`
    ///    times the runner-up's.
    pub fn guess_package<'c>(
        &self,
        module: &str,
        candidates: &'c [PackageCandidate],
    ) -> Option<Guess<'c>> {
        if self.stdlib.contains(module) {
            return None;
        }

        match candidates {
            [] => return None,
            [only] => {
                return Some(Guess {
                    candidate: only,
                    reason: GuessReason::OnlyCandidate,
                })
            }
            _ => {}
        }

        let wanted = (self.normalize)(module);
        if let Some(exact) = candidates
            .iter()
            .find(|c| (self.normalize)(&c.name) == wanted)
        {
            return Some(Guess {
                candidate: exact,
                reason: GuessReason::ExactNameMatch,
            });
        }

        let mut ranked: Vec<&PackageCandidate> = candidates.iter().collect();
        ranked.sort_by(|a, b| {
            b.popularity
                .cmp(&a.popularity)
                .then_with(|| a.name.cmp(&b.name))
        });

        let (first, second) = (ranked[0], ranked[1]);
        if first.popularity < POPULARITY_FLOOR {
            return None;
        }

        if per_module_score(first) >= per_module_score(second) * self.multiplier {
            return Some(Guess {
                candidate: first,
                reason: GuessReason::MorePopular,
            });
        }

        None
    }

    /// Resolve every extracted import to a package.
    ///
    /// Modules already provided by a `declared` package are skipped. A module
    /// carrying a package pragma uses that package verbatim.
    pub fn infer<'d>(
        &self,
        imports: &ImportScan,
        declared: impl IntoIterator<Item = &'d PkgName>,
    ) -> GuessResult {
        let mut available: HashSet<&str> = HashSet::new();
        for pkg in declared {
            if self.self_named_fallback {
                available.insert(pkg.as_str());
            }
            if let Some(candidate) = self.index.package(&(self.normalize)(pkg.as_str())) {
                available.extend(candidate.modules.iter().map(String::as_str));
            }
        }

        let mut result = GuessResult {
            success: imports.success,
            ..GuessResult::default()
        };

        for (module, pragma) in &imports.modules {
            if available.contains(module.as_str()) {
                tracing::debug!(module = %module, "already provided by a declared package");
                continue;
            }

            if let Some(package) = pragma {
                tracing::debug!(module = %module, package = %package, "using package pragma");
                result.packages.insert((self.normalize)(package));
                continue;
            }

            let fallback;
            let mut candidates = self.index.candidates_for(module);
            if candidates.is_empty() && self.self_named_fallback {
                fallback = [PackageCandidate::new(module.as_str(), 0, &[module.as_str()])];
                candidates = &fallback;
            }

            match self.guess_package(module, candidates) {
                Some(guess) => {
                    tracing::debug!(
                        module = %module,
                        package = %guess.candidate.name,
                        reason = %guess.reason,
                        "guessed package"
                    );
                    result.packages.insert((self.normalize)(&guess.candidate.name));
                }
                None => tracing::debug!(module = %module, "no confident guess"),
            }
        }

        result
    }
}

/// Popularity divided by the number of modules a package claims; packages
/// that declare many modules say less about any single one.
fn per_module_score(candidate: &PackageCandidate) -> f64 {
    candidate.popularity as f64 / candidate.modules.len().max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn normalize(name: &str) -> PkgName {
        PkgName::new(name.to_lowercase().replace('_', "-"))
    }

    fn guesser(index: &RegistryIndex) -> Guesser<'_> {
        Guesser {
            index,
            stdlib: stdlib::PYTHON,
            normalize,
            multiplier: 5.0,
            self_named_fallback: false,
        }
    }

    fn scan(modules: &[(&str, Option<&str>)]) -> ImportScan {
        ImportScan {
            modules: modules
                .iter()
                .map(|(m, p)| (m.to_string(), p.map(str::to_string)))
                .collect::<BTreeMap<_, _>>(),
            success: true,
        }
    }

    fn names(result: &GuessResult) -> Vec<&str> {
        result.packages.iter().map(PkgName::as_str).collect()
    }

    #[test]
    fn test_stdlib_is_never_guessed() {
        let index = RegistryIndex::default();
        let g = guesser(&index);
        let candidates = vec![PackageCandidate::new("os", 1_000_000, &["os"])];
        for module in ["os", "json", "asyncio", "cProfile"] {
            assert!(g.guess_package(module, &candidates).is_none());
        }
    }

    #[test]
    fn test_no_candidates() {
        let index = RegistryIndex::default();
        assert!(guesser(&index).guess_package("foo", &[]).is_none());
    }

    #[test]
    fn test_single_candidate_is_selected() {
        let index = RegistryIndex::default();
        // Even an obscure one: the floor only applies with competition
        let candidates = vec![PackageCandidate::new("bs4-shim", 3, &["bs4"])];
        let guess = guesser(&index).guess_package("bs4", &candidates).unwrap();
        assert_eq!(guess.candidate.name, "bs4-shim");
        assert_eq!(guess.reason, GuessReason::OnlyCandidate);
    }

    #[test]
    fn test_exact_name_beats_popularity() {
        let index = RegistryIndex::default();
        let candidates = vec![
            PackageCandidate::new("mega-toolkit", 10_000_000, &["date_util"]),
            PackageCandidate::new("Date-Util", 10, &["date_util", "other"]),
        ];
        let guess = guesser(&index).guess_package("date_util", &candidates).unwrap();
        assert_eq!(guess.candidate.name, "Date-Util");

        let candidates = vec![
            PackageCandidate::new("flask-compat", 9_000_000, &["flask_login"]),
            PackageCandidate::new("Flask-Login", 50, &["flask_login"]),
        ];
        let guess = guesser(&index).guess_package("flask_login", &candidates).unwrap();
        assert_eq!(guess.candidate.name, "Flask-Login");
        assert_eq!(guess.reason, GuessReason::ExactNameMatch);
    }

    #[test]
    fn test_popularity_floor() {
        let index = RegistryIndex::default();
        // 99 vs 1: a huge ratio, but the leader is still too obscure
        let candidates = vec![
            PackageCandidate::new("a", 99, &["foo"]),
            PackageCandidate::new("b", 1, &["foo"]),
        ];
        assert!(guesser(&index).guess_package("foo", &candidates).is_none());
    }

    #[test]
    fn test_per_module_ratio_selects_clear_winner() {
        let index = RegistryIndex::default();
        // Scores: A = 1000 / 2 = 500, B = 50 / 1 = 50
        let candidates = vec![
            PackageCandidate::new("b", 50, &["foo"]),
            PackageCandidate::new("a", 1000, &["foo", "bar"]),
        ];
        let guess = guesser(&index).guess_package("foo", &candidates).unwrap();
        assert_eq!(guess.candidate.name, "a");
        assert_eq!(guess.reason, GuessReason::MorePopular);
    }

    #[test]
    fn test_ambiguous_candidates_are_declined() {
        let index = RegistryIndex::default();
        // Scores: 1000 / 4 = 250 vs 100 / 1 = 100 -> only 2.5x apart
        let candidates = vec![
            PackageCandidate::new("a", 1000, &["foo", "w", "x", "y"]),
            PackageCandidate::new("b", 100, &["foo"]),
        ];
        assert!(guesser(&index).guess_package("foo", &candidates).is_none());
    }

    #[test]
    fn test_multiplier_is_tunable() {
        let index = RegistryIndex::default();
        let candidates = vec![
            PackageCandidate::new("a", 1000, &["foo"]),
            PackageCandidate::new("b", 150, &["foo"]),
        ];
        let mut g = guesser(&index);
        assert!(g.guess_package("foo", &candidates).is_some());
        g.multiplier = 10.0;
        assert!(g.guess_package("foo", &candidates).is_none());
    }

    #[test]
    fn test_infer_skips_modules_of_declared_packages() {
        let index = RegistryIndex::from_candidates(
            vec![
                PackageCandidate::new("beautifulsoup4", 5000, &["bs4"]),
                PackageCandidate::new("requests", 9000, &["requests"]),
            ],
            normalize,
        );
        let declared = [PkgName::new("BeautifulSoup4")];
        let result = guesser(&index).infer(&scan(&[("bs4", None), ("requests", None)]), &declared);
        assert_eq!(names(&result), ["requests"]);
        assert!(result.success);
    }

    #[test]
    fn test_infer_uses_pragmas() {
        let index = RegistryIndex::from_candidates(
            vec![PackageCandidate::new("PyYAML", 5000, &["yaml"])],
            normalize,
        );
        let result = guesser(&index).infer(
            &scan(&[("yaml", Some("Ruamel_Yaml")), ("json", Some("simplejson"))]),
            &[] as &[PkgName],
        );
        // Pragmas override even the stdlib check
        assert_eq!(names(&result), ["ruamel-yaml", "simplejson"]);
    }

    #[test]
    fn test_infer_self_named_fallback() {
        let index = RegistryIndex::default();
        let mut g = guesser(&index);
        g.stdlib = stdlib::NODE;
        g.self_named_fallback = true;

        let declared = [PkgName::new("express")];
        let result = g.infer(
            &scan(&[("express", None), ("lodash", None), ("fs", None)]),
            &declared,
        );
        assert_eq!(names(&result), ["lodash"]);
    }

    #[test]
    fn test_infer_propagates_extraction_failure() {
        let index = RegistryIndex::default();
        let mut imports = scan(&[]);
        imports.success = false;
        let result = guesser(&index).infer(&imports, &[] as &[PkgName]);
        assert!(result.packages.is_empty());
        assert!(!result.success);
    }
}
