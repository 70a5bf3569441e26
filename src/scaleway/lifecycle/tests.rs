use super::image::{filter_images, select_image_id};
use super::tags::merge_tag;
use super::*;
use crate::scaleway::IMAGE_ARCH;
use rstest::rstest;
use scaleway_rs::ScalewayImage;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

fn server_json(state: &str) -> String {
    format!(
        r#"{{"server":{{
            "id":"11111111-2222-3333-4444-555555555555",
            "name":"fleetup-abc",
            "state":"{state}",
            "allowed_actions":["poweron","terminate"],
            "public_ip":{{"address":"51.15.0.10"}},
            "private_ip":"10.64.0.3",
            "tags":["fleetup","Name=web-1"]
        }}}}"#
    )
}

fn snapshot(state: &str) -> InstanceSnapshot {
    let envelope: ServerEnvelope =
        serde_json::from_str(&server_json(state)).expect("server payload parses");
    InstanceSnapshot::from(envelope.server)
}

fn image(id: &str, arch: &str, state: &str, creation_date: &str) -> ScalewayImage {
    ScalewayImage {
        id: id.to_owned(),
        name: String::new(),
        arch: arch.to_owned(),
        creation_date: creation_date.to_owned(),
        modification_date: String::new(),
        from_server: None,
        organization: String::new(),
        public: true,
        state: state.to_owned(),
        project: String::new(),
        tags: vec![],
        zone: String::new(),
        root_volume: scaleway_rs::ScalewayImageRootVolume {
            id: String::new(),
            name: String::new(),
            size: 0,
            volume_type: String::new(),
        },
        default_bootscript: None,
        extra_volumes: scaleway_rs::ScalewayImageExtraVolumes {
            volumes: HashMap::new(),
        },
    }
}

#[rstest]
#[case("running", InstanceState::Running)]
#[case("starting", InstanceState::Pending)]
#[case("stopped", InstanceState::Pending)]
#[case("stopped in place", InstanceState::Pending)]
#[case("locked", InstanceState::Failed { reason: String::from("locked") })]
#[case("stopping", InstanceState::Failed { reason: String::from("stopping") })]
fn maps_server_state(#[case] state: &str, #[case] expected: InstanceState) {
    assert_eq!(snapshot(state).lifecycle_state(), expected);
}

#[test]
fn snapshot_exposes_both_addresses() {
    let addresses = snapshot("running").addresses();
    assert_eq!(
        addresses.public_ip,
        Some(IpAddr::V4(Ipv4Addr::new(51, 15, 0, 10)))
    );
    assert_eq!(
        addresses.private_ip,
        Some(IpAddr::V4(Ipv4Addr::new(10, 64, 0, 3)))
    );
}

#[test]
fn snapshot_falls_back_to_routed_public_ips() {
    let payload = r#"{"server":{
        "id":"srv","state":"running",
        "public_ip":null,
        "public_ips":[{"address":"2001:db8::1"}]
    }}"#;
    let envelope: ServerEnvelope = serde_json::from_str(payload).expect("payload parses");
    let addresses = InstanceSnapshot::from(envelope.server).addresses();
    assert_eq!(
        addresses.public_ip,
        Some(IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)))
    );
    assert_eq!(addresses.private_ip, None);
}

#[test]
fn unparseable_address_is_absent() {
    assert_eq!(parse_ip(Some("not-an-ip")), None);
    assert_eq!(parse_ip(None), None);
}

#[test]
fn merge_tag_replaces_previous_value() {
    let existing = vec![
        String::from("fleetup"),
        String::from("Name=old"),
        String::from("Named=keep"),
    ];
    assert_eq!(
        merge_tag(&existing, "Name", "web-1"),
        vec!["fleetup", "Named=keep", "Name=web-1"]
    );
}

#[test]
fn merge_tag_appends_new_key() {
    assert_eq!(
        merge_tag(&[], "storage-policy", "delete-on-termination"),
        vec!["storage-policy=delete-on-termination"]
    );
}

#[test]
fn select_image_prefers_newest_available_for_arch() {
    let candidates = filter_images(vec![
        image("old", IMAGE_ARCH, "available", "2024-01-01T00:00:00Z"),
        image("new", IMAGE_ARCH, "available", "2025-06-01T00:00:00Z"),
        image("arm", "arm64", "available", "2026-01-01T00:00:00Z"),
        image("broken", IMAGE_ARCH, "error", "2026-02-01T00:00:00Z"),
    ]);
    assert_eq!(select_image_id(candidates), Some(String::from("new")));
}

#[test]
fn select_image_without_candidates_is_none() {
    assert_eq!(select_image_id(Vec::new()), None);
}

#[test]
fn api_error_prefers_provider_message() {
    let body = br#"{"type":"not_found","message":"resource is not found"}"#;
    let err = api_error(StatusCode::NOT_FOUND, body);
    assert!(err.has_status(404));
}

#[test]
fn api_error_keeps_raw_body_when_unstructured() {
    let err = api_error(StatusCode::BAD_GATEWAY, b"upstream down");
    assert_eq!(
        err,
        ScalewayProviderError::Api {
            status: 502,
            message: String::from("upstream down"),
        }
    );
}
