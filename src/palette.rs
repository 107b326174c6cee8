/// Class-to-color lookup used for drawing boxes and sent to the service as `color_mapping`.

use std::collections::BTreeMap;

/// Known finding classes, in the order the service documents them.
pub const CLASS_LABELS: [&str; 9] = [
    "Cardiomegaly",
    "Pleural thickening",
    "Pulmonary fibrosis",
    "Pleural effusion",
    "Nodule/Mass",
    "Infiltration",
    "Consolidation",
    "Atelectasis",
    "Pneumothorax",
];

const DEFAULT_RGB: [u8; 3] = [59, 130, 246];

/// RGB color for a class label. Case-insensitive; unknown or empty labels get the default blue.
pub fn rgb_for(class_label: &str) -> [u8; 3] {
    match class_label.trim().to_lowercase().as_str() {
        "cardiomegaly" => [239, 68, 68],
        "pleural thickening" => [139, 92, 246],
        "pulmonary fibrosis" => [236, 72, 153],
        "pleural effusion" => [34, 197, 94],
        "nodule/mass" => [59, 130, 246],
        "infiltration" => [245, 158, 11],
        "consolidation" => [14, 165, 233],
        "atelectasis" => [249, 115, 22],
        "pneumothorax" => [168, 85, 247],
        _ => DEFAULT_RGB,
    }
}

/// CSS color string: `#rrggbb`, or `rgba(r, g, b, a)` when a non-zero opacity is given.
pub fn color_for(class_label: &str, opacity: Option<f32>) -> String {
    let [r, g, b] = rgb_for(class_label);
    match opacity {
        Some(a) if a != 0.0 => format!("rgba({r}, {g}, {b}, {a})"),
        _ => format!("#{r:02x}{g:02x}{b:02x}"),
    }
}

/// `color_mapping` form field: every known class mapped to its hex color.
pub fn color_mapping() -> BTreeMap<&'static str, String> {
    CLASS_LABELS
        .iter()
        .map(|&label| (label, color_for(label, None)))
        .collect()
}
