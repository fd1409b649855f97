//! Property tests for codecs and ordering

use lime_package::embedded::{decode, encode};
use lime_package::{EmbeddedFileContents, InstallOrderComputer, Version};
use proptest::prelude::*;

proptest! {
    #[test]
    fn ascii85_round_trips(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let text = encode(&data);
        prop_assert!(text.bytes().all(|b| (b'!'..=b'u').contains(&b) || b == b'z'));
        prop_assert_eq!(decode(&text).unwrap(), data);
    }

    #[test]
    fn ascii85_ignores_whitespace(data in proptest::collection::vec(any::<u8>(), 1..128)) {
        let text = encode(&data);
        let wrapped: String = text
            .chars()
            .enumerate()
            .flat_map(|(i, c)| if i % 10 == 9 { vec![c, '\n'] } else { vec![c] })
            .collect();
        prop_assert_eq!(decode(&wrapped).unwrap(), data);
    }

    #[test]
    fn embedded_contents_survive_yaml(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let yaml = serde_yaml::to_string(&EmbeddedFileContents::new(data.clone())).unwrap();
        let back: EmbeddedFileContents = serde_yaml::from_str(&yaml).unwrap();
        prop_assert_eq!(back.into_bytes(), data);
    }

    #[test]
    fn version_text_round_trips(
        major in 0u64..10_000,
        minor in 0u64..10_000,
        patch in 0u64..10_000,
        tag in proptest::option::of("[a-z0-9]{1,8}"),
    ) {
        let mut version = Version::new(major, minor, patch);
        if let Some(tag) = &tag {
            version = version.with_tag(tag.clone());
        }
        let parsed = Version::parse(&version.to_string()).unwrap();
        prop_assert_eq!(&parsed, &version);
        prop_assert_eq!(parsed.tag, tag);
    }

    #[test]
    fn version_order_ignores_tag(
        a in (0u64..50, 0u64..50, 0u64..50),
        b in (0u64..50, 0u64..50, 0u64..50),
    ) {
        let left = Version::new(a.0, a.1, a.2).with_tag("x");
        let right = Version::new(b.0, b.1, b.2);
        prop_assert_eq!(left.cmp(&right), a.cmp(&b));
    }

    /// Every dependency edge of an acyclic graph points backwards in the
    /// computed order
    #[test]
    fn install_order_respects_edges(edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40)) {
        let mut computer = InstallOrderComputer::new();
        for i in 0..12 {
            computer.add_package(format!("p{i}"));
        }
        // Only keep edges from higher to lower index, which cannot cycle
        let kept: Vec<(usize, usize)> = edges.into_iter().filter(|(a, b)| a > b).collect();
        for (a, b) in &kept {
            computer.add_dependency(format!("p{a}"), format!("p{b}"));
        }

        let order = computer.compute().unwrap();
        prop_assert_eq!(order.len(), 12);
        let position = |name: String| order.iter().position(|n| *n == name).unwrap();
        for (dependent, target) in kept {
            let target_at = position(format!("p{}", target));
            let dependent_at = position(format!("p{}", dependent));
            prop_assert!(target_at < dependent_at);
        }
    }
}
