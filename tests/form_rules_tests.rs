/// Tests for settings resolution and form validation as the page sees them
use loan_lead_form::config::Config;
use loan_lead_form::settings::{resolve_settings, SettingsProps, SettingsQuery};
use loan_lead_form::validation::{Field, LeadForm};

#[cfg(test)]
mod settings_tests {
    use super::*;

    fn query(pairs: &str) -> SettingsQuery {
        serde_json::from_value(
            pairs
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect::<serde_json::Map<_, _>>()
                .into(),
        )
        .unwrap()
    }

    #[test]
    fn test_color_and_brand_params_override_props() {
        let config = Config::default();
        let props = SettingsProps {
            button_color: Some("#123456".to_string()),
            brand: Some("Prop Brand".to_string()),
            ..Default::default()
        };

        let settings = resolve_settings(&props, &query("color=blue&brand=Acme+Co"), &config.palette);

        assert_eq!(settings.button_color.as_deref(), Some("#0000FF"));
        assert_eq!(settings.brand, "Acme Co");
    }

    #[test]
    fn test_deployment_defaults_without_params() {
        let config = Config::default();
        let settings =
            resolve_settings(&config.form_defaults, &SettingsQuery::default(), &config.palette);

        assert_eq!(settings.country, "AU");
        assert_eq!(settings.button_color.as_deref(), Some("#000000"));
        assert_eq!(settings.lead_source, "Business Loan Form");
        assert_eq!(settings.brand, "N/A");
        assert_eq!(settings.button_text, "Submit");
    }

    #[test]
    fn test_source_param_wins_over_brand_param() {
        let config = Config::default();
        let settings = resolve_settings(
            &config.form_defaults,
            &query("brand=Ignored&source=Partner+Portal"),
            &config.palette,
        );
        assert_eq!(settings.brand, "Partner Portal");
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_typed_form_validates() {
        let mut form = LeadForm::default();
        form.apply_change(Field::Amount, "150,000");
        form.apply_change(Field::Fname, "sam");
        form.apply_change(Field::Lname, "o'brien");
        form.apply_change(Field::Email, "sam@example.com");
        form.apply_change(Field::Phone, "0498 765 432");

        let lead = form.validate().unwrap();
        assert_eq!(lead.fname, "Sam");
        assert_eq!(lead.lname, "O'brien");
        assert_eq!(lead.amount, 150_000);
        assert_eq!(lead.phone, "0498765432");
    }

    #[test]
    fn test_name_capitalization_ignores_later_casing() {
        let mut form = LeadForm::default();
        for typed in ["s", "sA", "sAM", "SAM", "sam"] {
            form.apply_change(Field::Fname, typed);
        }
        assert_eq!(form.fname, "Sam");

        form.apply_change(Field::Lname, "van der berg");
        assert_eq!(form.lname, "Van der berg");
    }

    #[test]
    fn test_landline_is_rejected() {
        let form = LeadForm {
            fname: "Sam".to_string(),
            lname: "Lee".to_string(),
            email: "sam@example.com".to_string(),
            phone: "0298765432".to_string(),
            amount: "5000".to_string(),
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get(Field::Phone), Some("Must be an Australian Mobile"));
    }

    #[test]
    fn test_zero_amount_is_rejected() {
        let form = LeadForm {
            fname: "Sam".to_string(),
            lname: "Lee".to_string(),
            email: "sam@example.com".to_string(),
            phone: "0498765432".to_string(),
            amount: "0".to_string(),
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get(Field::Amount),
            Some("Loan amount must be between $1 and $100,000,000")
        );
    }
}
