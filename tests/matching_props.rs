// tests/matching_props.rs

//! Property tests for version range matching, capability matching,
//! applicability filters and id/range queries.

use proptest::prelude::*;
use provisioner::director::{ProfileChangeRequest, ProvisioningContext};
use provisioner::metadata::{Filter, InstallableUnit, ProvidedCapability, Requirement};
use provisioner::progress::NullMonitor;
use provisioner::query::IuCollection;
use provisioner::{Planner, Profile, Query, Version, VersionRange};
use std::collections::BTreeMap;
use std::sync::Arc;

const NAMESPACES: [&str; 3] = ["java.package", "osgi.bundle", "service"];
const NAMES: [&str; 2] = ["alpha", "beta"];

fn is_linux(os: Option<&str>, _arch: Option<&str>) -> bool {
    os == Some("linux")
}

fn is_not_linux(os: Option<&str>, _arch: Option<&str>) -> bool {
    os != Some("linux")
}

fn is_linux_x86(os: Option<&str>, arch: Option<&str>) -> bool {
    os == Some("linux") && arch == Some("x86")
}

fn is_win32_or_arm(os: Option<&str>, arch: Option<&str>) -> bool {
    os == Some("win32") || arch == Some("arm")
}

fn has_os(os: Option<&str>, _arch: Option<&str>) -> bool {
    os.is_some()
}

/// Applicability filters paired with their meaning over `os` and `arch`
const FILTERS: [(&str, fn(Option<&str>, Option<&str>) -> bool); 5] = [
    ("(os=linux)", is_linux),
    ("(!(os=linux))", is_not_linux),
    ("(&(os=linux)(arch=x86))", is_linux_x86),
    ("(|(os=win32)(arch=arm))", is_win32_or_arm),
    ("(os=*)", has_os),
];

/// Qualifier-free versions with a non-zero micro segment
fn plain_version_strategy() -> impl Strategy<Value = Version> {
    (0u64..4, 0u64..4, 1u64..4).prop_map(|(major, minor, micro)| Version::new(major, minor, micro))
}

/// Below `version`, above its qualifier-free predecessor
fn just_below(version: &Version) -> Version {
    Version::new(version.major(), version.minor(), version.micro() - 1).with_qualifier("zz")
}

/// Above `version`, below the next qualifier-free version
fn just_above(version: &Version) -> Version {
    version.clone().with_qualifier("a")
}

fn capability_strategy() -> impl Strategy<Value = ProvidedCapability> {
    (
        prop::sample::select(NAMESPACES.to_vec()),
        prop::sample::select(NAMES.to_vec()),
        version_strategy(),
    )
        .prop_map(|(namespace, name, version)| ProvidedCapability::new(namespace, name, version))
}

fn capability_requirement_strategy() -> impl Strategy<Value = Requirement> {
    (
        prop::sample::select(NAMESPACES.to_vec()),
        prop::sample::select(NAMES.to_vec()),
        range_strategy(),
    )
        .prop_map(|(namespace, name, range)| Requirement::new(namespace, name, range))
}

fn holder(id: &str, capabilities: &[ProvidedCapability]) -> InstallableUnit {
    capabilities
        .iter()
        .fold(InstallableUnit::builder(id, Version::new(1, 0, 0)), |builder, cap| {
            builder.provides(cap.clone())
        })
        .build()
        .unwrap()
}

fn expected_match(requirement: &Requirement, capabilities: &[ProvidedCapability]) -> bool {
    capabilities.iter().any(|cap| {
        cap.namespace == requirement.namespace
            && cap.name == requirement.name
            && requirement.range.contains(&cap.version)
    })
}

proptest! {
    #[test]
    fn test_contains_agrees_with_bounds(range in range_strategy(), version in version_strategy()) {
        let above = if range.floor_inclusive() {
            &version >= range.floor()
        } else {
            &version > range.floor()
        };
        let below = if range.ceiling_inclusive() {
            &version <= range.ceiling()
        } else {
            &version < range.ceiling()
        };
        prop_assert_eq!(range.contains(&version), above && below);
    }

    #[test]
    fn test_boundaries_follow_inclusivity(range in range_strategy()) {
        prop_assert_eq!(range.contains(range.floor()), range.floor_inclusive());
        prop_assert_eq!(range.contains(range.ceiling()), range.ceiling_inclusive());
    }

    #[test]
    fn test_display_parses_back(range in range_strategy()) {
        let parsed = VersionRange::parse(&range.to_string()).unwrap();
        prop_assert_eq!(parsed, range);
    }

    #[test]
    fn test_requirement_matches_id_and_range(
        range in range_strategy(),
        version in version_strategy(),
        same_id in any::<bool>(),
    ) {
        let id = if same_id { "target" } else { "other" };
        let unit = InstallableUnit::builder(id, version.clone()).build().unwrap();
        let requirement = Requirement::unit("target", range.clone());
        prop_assert_eq!(requirement.is_match(&unit), same_id && range.contains(&version));
    }

    #[test]
    fn test_id_range_query_selects_contained_versions(
        range in range_strategy(),
        versions in prop::collection::vec(version_strategy(), 0..12),
    ) {
        let collection = IuCollection::from_units(versions.iter().map(|v| {
            Arc::new(InstallableUnit::builder("target", v.clone()).build().unwrap())
        }));
        let found = collection
            .query(&Query::id_range("target", range.clone()), &NullMonitor::new())
            .unwrap()
            .into_vec();

        let mut expected: Vec<Version> = versions
            .iter()
            .filter(|v| range.contains(v))
            .cloned()
            .collect();
        expected.sort();
        expected.dedup();
        let mut actual: Vec<Version> = found.iter().map(|u| u.version.clone()).collect();
        actual.sort();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn test_neighbours_of_distinct_bounds(
        a in plain_version_strategy(),
        b in plain_version_strategy(),
        floor_inclusive in any::<bool>(),
        ceiling_inclusive in any::<bool>(),
    ) {
        prop_assume!(a != b);
        let (floor, ceiling) = if a < b { (a, b) } else { (b, a) };
        let range = VersionRange::new(floor.clone(), floor_inclusive, ceiling.clone(), ceiling_inclusive)
            .unwrap();

        prop_assert!(!range.contains(&just_below(&floor)));
        prop_assert!(range.contains(&just_above(&floor)));
        prop_assert!(range.contains(&just_below(&ceiling)));
        prop_assert!(!range.contains(&just_above(&ceiling)));
        prop_assert_eq!(range.contains(&floor), floor_inclusive);
        prop_assert_eq!(range.contains(&ceiling), ceiling_inclusive);
    }

    #[test]
    fn test_exact_range_excludes_neighbours(version in plain_version_strategy()) {
        let range = VersionRange::exact(version.clone());
        prop_assert!(range.contains(&version));
        prop_assert!(!range.contains(&just_below(&version)));
        prop_assert!(!range.contains(&just_above(&version)));
    }

    #[test]
    fn test_match_considers_every_capability(
        capabilities in prop::collection::vec(capability_strategy(), 1..6),
        requirement in capability_requirement_strategy(),
    ) {
        let unit = holder("holder", &capabilities);
        prop_assert_eq!(requirement.is_match(&unit), expected_match(&requirement, &capabilities));
    }

    #[test]
    fn test_providers_across_namespaces(
        holders in prop::collection::vec(prop::collection::vec(capability_strategy(), 0..4), 1..6),
        requirement in capability_requirement_strategy(),
    ) {
        let collection = IuCollection::from_units(
            holders
                .iter()
                .enumerate()
                .map(|(i, caps)| Arc::new(holder(&format!("h{}", i), caps))),
        );
        let found: Vec<String> = collection
            .providers(&requirement)
            .iter()
            .map(|u| u.id.clone())
            .collect();
        let expected: Vec<String> = holders
            .iter()
            .enumerate()
            .filter(|(_, caps)| expected_match(&requirement, caps))
            .map(|(i, _)| format!("h{}", i))
            .collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn test_filtered_requirement_applies_only_when_filter_matches(
        index in 0..FILTERS.len(),
        os in prop::option::of(prop::sample::select(vec!["linux", "win32"])),
        arch in prop::option::of(prop::sample::select(vec!["x86", "arm"])),
    ) {
        let (text, meaning) = FILTERS[index];
        let applies = meaning(os, arch);
        let mut environment = BTreeMap::new();
        if let Some(os) = os {
            environment.insert("os".to_string(), os.to_string());
        }
        if let Some(arch) = arch {
            environment.insert("arch".to_string(), arch.to_string());
        }

        let filter = Filter::parse(text).unwrap();
        prop_assert_eq!(filter.matches(&environment), applies);
        let requirement = Requirement::unit("absent", VersionRange::any()).with_filter(filter);
        prop_assert_eq!(requirement.is_applicable(&environment), applies);

        // A missing provider only matters when the requirement applies
        let app = Arc::new(
            InstallableUnit::builder("app", Version::new(1, 0, 0))
                .requires(requirement)
                .build()
                .unwrap(),
        );
        let context = environment.iter().fold(
            ProvisioningContext::new().with_extra_units([app.clone()]),
            |context, (name, value)| context.with_property(name, value),
        );
        let mut request = ProfileChangeRequest::new(Arc::new(Profile::empty("p")));
        request.add(app);
        let plan = Planner::new()
            .get_provisioning_plan(&request, &context, &NullMonitor::new())
            .unwrap();
        prop_assert_eq!(plan.status.is_error(), applies);
    }
}
