//! Expansion of the bundled templates

use agora_crypto::{agreement_id_bytes, derive_agreement_id, derive_conditions};
use agora_templates::{placeholders, TemplateEngine, TemplateError, TemplateParams};
use agora_types::{
    Address, Bytes32, ConditionRole, ContractAddresses, ParamValue, RewardSchedule, ServiceType, U256,
};

fn consumer() -> Address {
    Address::new([0xcc; 20])
}

fn publisher() -> Address {
    Address::new([0xbb; 20])
}

fn params(contracts: &ContractAddresses) -> TemplateParams {
    TemplateParams::new()
        .with_contracts(contracts)
        .with("did", Bytes32::new([0xd1; 32]))
        .with("consumer", consumer())
        .with("publisher", publisher())
        .with("tokenAddress", contracts.token)
        .with("timeout", 100u64)
}

fn rewards() -> RewardSchedule {
    RewardSchedule::new(
        vec![publisher(), Address::new([0xfe; 20])],
        vec![U256::from(9u64), U256::from(1u64)],
    )
    .with_nft_count(U256::from(1u64))
}

fn expected(service_type: ServiceType) -> Vec<&'static str> {
    match service_type {
        ServiceType::Access => vec!["lockPayment", "access", "escrowPayment"],
        ServiceType::Compute => vec!["lockPayment", "execCompute", "escrowPayment"],
        ServiceType::DidSale => vec!["lockPayment", "transferDID", "escrowPayment"],
        ServiceType::NftAccess => vec!["nftHolder", "nftAccess"],
        ServiceType::NftSale => vec!["lockPayment", "transferNFT", "escrowPayment"],
        ServiceType::Metadata => vec![],
    }
}

#[test]
fn test_every_bundled_template_expands_in_declared_order() {
    let engine = TemplateEngine::bundled();
    let contracts = ContractAddresses::default();
    for service_type in ServiceType::ORDERABLE {
        let conditions = engine
            .expand_service(service_type, &params(&contracts), &rewards())
            .unwrap();
        let names: Vec<&str> = conditions.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, expected(service_type), "{}", service_type);

        assert_eq!(conditions[0].role, ConditionRole::Lock);
        assert_eq!(conditions[1].role, ConditionRole::Service);
        assert_eq!(conditions[1].timeout, 100);
        if let Some(reward) = conditions.get(2) {
            assert_eq!(reward.role, ConditionRole::Reward);
            assert_eq!(reward.contract_address, contracts.escrow_payment_condition);
        }
    }
}

#[test]
fn test_expanded_conditions_derive_ids() {
    let engine = TemplateEngine::bundled();
    let contracts = ContractAddresses::default();
    let agreement = agreement_id_bytes(&derive_agreement_id()).unwrap();
    for service_type in ServiceType::ORDERABLE {
        let conditions = engine
            .expand_service(service_type, &params(&contracts), &rewards())
            .unwrap();
        let bound = derive_conditions(&agreement, &conditions).unwrap();
        assert_eq!(bound.len(), conditions.len());
    }
}

#[test]
fn test_reward_schedule_tokens_become_arrays() {
    let contracts = ContractAddresses::default();
    let conditions = TemplateEngine::bundled()
        .expand_service(ServiceType::Access, &params(&contracts), &rewards())
        .unwrap();
    let lock = &conditions[0];
    assert_eq!(
        lock.param("_amounts").unwrap().value,
        ParamValue::Array(vec!["9".to_string(), "1".to_string()])
    );
    assert_eq!(
        lock.param("_receivers").unwrap().value,
        ParamValue::Array(vec![publisher().to_string(), Address::new([0xfe; 20]).to_string()])
    );
    let escrow = &conditions[2];
    assert_eq!(
        escrow.param("_releaseCondition").unwrap().value,
        ParamValue::ConditionRef("access".to_string())
    );
}

#[test]
fn test_missing_template_is_not_found() {
    let engine = TemplateEngine::empty().with_template(ServiceType::Access, "{}");
    assert_eq!(
        engine.load_template(ServiceType::Compute).unwrap_err(),
        TemplateError::NotFound(ServiceType::Compute)
    );
    assert_eq!(engine.service_types(), vec![ServiceType::Access]);
}

#[test]
fn test_missing_parameter_fails_whole_expansion() {
    let contracts = ContractAddresses::default();
    let incomplete = TemplateParams::new()
        .with_contracts(&contracts)
        .with("did", Bytes32::new([0xd1; 32]));
    let err = TemplateEngine::bundled()
        .expand_service(ServiceType::Access, &incomplete, &rewards())
        .unwrap_err();
    match err {
        TemplateError::InitializeConditions(reason) => {
            assert!(reason.contains("tokenAddress"));
            assert!(reason.contains("consumer"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_mismatched_schedule_is_rejected() {
    let contracts = ContractAddresses::default();
    let lopsided = RewardSchedule::new(vec![publisher()], vec![U256::from(9u64), U256::from(1u64)]);
    let err = TemplateEngine::bundled()
        .expand_service(ServiceType::Access, &params(&contracts), &lopsided)
        .unwrap_err();
    assert!(matches!(err, TemplateError::InitializeConditions(_)));
}

#[test]
fn test_nft_templates_need_a_count() {
    let contracts = ContractAddresses::default();
    let no_count = RewardSchedule::new(vec![publisher()], vec![U256::from(10u64)]);
    for service_type in [ServiceType::NftAccess, ServiceType::NftSale] {
        let err = TemplateEngine::bundled()
            .expand_service(service_type, &params(&contracts), &no_count)
            .unwrap_err();
        assert!(matches!(err, TemplateError::InitializeConditions(ref r) if r.contains("numberNfts")));
    }
}

#[test]
fn test_malformed_and_misordered_templates() {
    let contracts = ContractAddresses::default();
    let broken = TemplateEngine::empty().with_template(ServiceType::Access, r#"{"conditions": [ {"name": "#);
    assert!(matches!(
        broken.expand_service(ServiceType::Access, &params(&contracts), &rewards()),
        Err(TemplateError::InitializeConditions(_))
    ));

    let reward_first = r#"{"conditions": [
        {"name": "escrow", "contractName": "E", "contractAddress": "{contracts.escrowPaymentCondition}", "role": "reward"},
        {"name": "lock", "contractName": "L", "contractAddress": "{contracts.lockPaymentCondition}", "role": "lock"}
    ]}"#;
    let misordered = TemplateEngine::empty().with_template(ServiceType::Access, reward_first);
    assert!(matches!(
        misordered.expand_service(ServiceType::Access, &params(&contracts), &rewards()),
        Err(TemplateError::InitializeConditions(_))
    ));
}

#[test]
fn test_reference_to_later_condition_is_rejected() {
    let contracts = ContractAddresses::default();
    let template = r#"{"conditions": [
        {"name": "lock", "contractName": "L", "contractAddress": "{contracts.lockPaymentCondition}", "role": "lock",
         "parameters": [{"name": "_next", "type": "bytes32", "ref": "serve"}]},
        {"name": "serve", "contractName": "A", "contractAddress": "{contracts.accessCondition}", "role": "service"}
    ]}"#;
    let engine = TemplateEngine::empty().with_template(ServiceType::Access, template);
    assert!(matches!(
        engine.expand_service(ServiceType::Access, &params(&contracts), &rewards()),
        Err(TemplateError::InitializeConditions(_))
    ));
}

#[test]
fn test_bundled_templates_only_use_known_tokens() {
    let engine = TemplateEngine::bundled();
    let known = params(&ContractAddresses::default());
    for service_type in ServiceType::ORDERABLE {
        for token in placeholders(engine.load_template(service_type).unwrap()) {
            let reserved = ["amounts", "receivers", "numberNfts"].contains(&token.as_str());
            assert!(reserved || known.get(&token).is_some(), "{} in {}", token, service_type);
        }
    }
}
