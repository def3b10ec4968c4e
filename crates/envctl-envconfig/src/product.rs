// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-product adjustments to simple configs.

use serde_json::{json, Map, Value};
use tracing::debug;

pub const PRODUCT_K8S_AUDIT: &str = "k8s-audit";
pub const PRODUCT_INGRESS_NGINX: &str = "k8s-ingress-nginx";
pub const DEFAULT_PRODUCT_LANG: &str = "cn";

const NGINX_INGRESS_REGEX: &str = r#"^(\S+)\s-\s\[([^]]+)]\s-\s(\S+)\s\[(\S+)\s\S+\s"(\w+)\s(\S+)\s([^"]+)"\s(\d+)\s(\d+)\s"([^"]*)"\s"([^"]*)"\s(\S+)\s(\S+)+\s\[([^]]*)]\s(\S+)\s(\S+)\s(\S+)\s(\S+)\s(\S+)\s*(\S*).*"#;

const NGINX_INGRESS_KEYS: &[&str] = &[
	"client_ip",
	"x_forward_for",
	"remote_user",
	"time",
	"method",
	"url",
	"version",
	"status",
	"body_bytes_sent",
	"http_referer",
	"http_user_agent",
	"request_length",
	"request_time",
	"proxy_upstream_name",
	"upstream_addr",
	"upstream_response_length",
	"upstream_response_time",
	"upstream_status",
	"req_id",
	"host",
];

fn nginx_ingress_processor() -> Value {
	json!({
		"type": "processor_regex",
		"detail": {
			"SourceKey": "content",
			"Regex": NGINX_INGRESS_REGEX,
			"Keys": NGINX_INGRESS_KEYS,
			"NoKeyError": true,
			"NoMatchError": true,
			"KeepSource": false,
		}
	})
}

/// Apply the template for `product` to a simple plugin detail.
///
/// Unknown products and non-plugin details are left untouched.
pub fn apply_product_template(product: &str, detail: &mut Map<String, Value>) {
	if product != PRODUCT_INGRESS_NGINX {
		return;
	}
	let Some(plugin) = detail.get_mut("plugin").and_then(Value::as_object_mut) else {
		return;
	};
	let processors = plugin
		.entry("processors")
		.or_insert_with(|| Value::Array(Vec::new()));
	if let Some(processors) = processors.as_array_mut() {
		processors.push(nginx_ingress_processor());
		debug!(product, "applied product processor");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn plugin_detail() -> Map<String, Value> {
		json!({"plugin": {"inputs": [{"type": "service_docker_stdout"}]}})
			.as_object()
			.cloned()
			.unwrap()
	}

	#[test]
	fn nginx_ingress_adds_regex_processor() {
		let mut detail = plugin_detail();
		apply_product_template(PRODUCT_INGRESS_NGINX, &mut detail);
		let processors = detail["plugin"]["processors"].as_array().unwrap();
		assert_eq!(processors.len(), 1);
		assert_eq!(processors[0]["type"], "processor_regex");
		assert_eq!(
			processors[0]["detail"]["Keys"].as_array().unwrap().len(),
			NGINX_INGRESS_KEYS.len()
		);
	}

	#[test]
	fn other_products_are_untouched() {
		let mut detail = plugin_detail();
		apply_product_template(PRODUCT_K8S_AUDIT, &mut detail);
		assert_eq!(detail, plugin_detail());
	}

	#[test]
	fn file_details_are_untouched() {
		let mut detail = json!({"logPath": "/var/log/"}).as_object().cloned().unwrap();
		let before = detail.clone();
		apply_product_template(PRODUCT_INGRESS_NGINX, &mut detail);
		assert_eq!(detail, before);
	}
}
