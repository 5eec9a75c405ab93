pub const REFERENCE_IMAGES: &str = include_str!("../data/prompts/reference_images.txt");

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Append the reference-image count note to `prompt` when more than one
/// source image is supplied. Single-image and text-only prompts are unchanged.
pub fn annotate_reference_images(prompt: &str, image_count: usize) -> String {
    if image_count <= 1 {
        return prompt.to_string();
    }
    let note = render(
        REFERENCE_IMAGES.trim_end(),
        &[("count", &image_count.to_string())],
    );
    format!("{}\n\n{}", prompt, note)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_var() {
        assert_eq!(
            render("Hello {{name}}!", &[("name", "world")]),
            "Hello world!"
        );
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        assert_eq!(render("{{a}} and {{b}}", &[("a", "cats")]), "cats and {{b}}");
    }

    #[test]
    fn test_reference_template_has_count_placeholder() {
        assert!(REFERENCE_IMAGES.contains("{{count}}"));
    }

    #[test]
    fn test_annotation_only_for_multiple_images() {
        assert_eq!(annotate_reference_images("a cat", 0), "a cat");
        assert_eq!(annotate_reference_images("a cat", 1), "a cat");

        let annotated = annotate_reference_images("a cat", 3);
        assert!(annotated.starts_with("a cat\n\n"));
        assert!(annotated.contains("3 reference images"));
        assert!(!annotated.ends_with('\n'));
    }
}
