//! Environment exported to action children.
//!
//! The variable set is a pure function of the context: building it twice
//! yields the same map, and keys are unique by construction so ordering can
//! never shadow a value.

use std::collections::BTreeMap;

use crate::context::Context;
use crate::pargv::Pargv;
use crate::scheme::Scheme;

pub fn action_env(ctx: &Context) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    env.insert("KLISH_TYPE".to_string(), ctx.kind.as_env_str().to_string());
    env.insert("KLISH_PID".to_string(), ctx.session.pid.to_string());
    env.insert("KLISH_UID".to_string(), ctx.session.uid.to_string());
    env.insert("KLISH_USER".to_string(), ctx.session.user.clone());

    if let Some(pargv) = ctx.pargv {
        if let Some(cmd) = pargv.command {
            env.insert(
                "KLISH_COMMAND".to_string(),
                ctx.scheme.name(cmd).to_string(),
            );
        }
        add_pargv_env(&mut env, ctx.scheme, pargv, "KLISH_PARAM_");
    }

    if let Some(parent) = ctx.parent_pargv {
        add_pargv_env(&mut env, ctx.scheme, parent, "KLISH_PARENT_");
    }

    if let Some(value) = ctx.candidate_value() {
        env.insert("KLISH_VALUE".to_string(), value.to_string());
    }

    env
}

/// For a parameter `P` bound to `v_0..v_{k-1}`: `<prefix>P=v_0` plus
/// `<prefix>P_<i>=v_i` for every instance.
fn add_pargv_env(
    env: &mut BTreeMap<String, String>,
    scheme: &Scheme,
    pargv: &Pargv,
    prefix: &str,
) {
    let mut seen: Vec<&str> = Vec::new();
    for parg in &pargv.pargs {
        let name = scheme.name(parg.entry);
        if seen.contains(&name) {
            continue;
        }
        seen.push(name);
        let values = pargv.values_of(scheme, name);
        if values.is_empty() {
            continue;
        }
        env.insert(format!("{prefix}{name}"), values[0].to_string());
        for (i, value) in values.iter().enumerate() {
            env.insert(format!("{prefix}{name}_{i}"), value.to_string());
        }
    }
}
