//! Control-block discovery
//!
//! Total simulated time is the sum of `steps x dt` over every `<Control>`
//! block in the document, wherever it sits: the top-level block and any
//! blocks nested inside step sub-blocks all contribute.

use super::xml::XmlElement;

fn block_time(control: &XmlElement) -> Option<f64> {
    let steps: f64 = control.child("time_steps")?.text().trim().parse().ok()?;
    let dt: f64 = control.child("step_size")?.text().trim().parse().ok()?;
    Some(steps * dt)
}

/// Sum simulated time over every `<Control>` block reachable from `root`.
pub fn total_time(root: &XmlElement) -> f64 {
    let mut total = 0.0;
    root.walk(&mut |el| {
        if el.name == "Control" {
            if let Some(t) = block_time(el) {
                total += t;
            }
        }
    });
    total
}
