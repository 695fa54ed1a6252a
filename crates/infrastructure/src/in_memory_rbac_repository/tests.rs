use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use praetor_application::{
    AccessContext, AccessVerifier, AssignRoleInput, AuditLogQuery, AuditRecorder, AuditRepository, CreateRoleInput, EngineConfig,
    PermissionResolver, PrincipalRepository, PrincipalUpsert, RoleAssignmentRepository,
    RoleAssignmentService, RoleHierarchyService, RoleRepository,
};
use praetor_core::{AppError, AssignmentId, PrincipalId, RoleId, TenantId};
use praetor_domain::{
    Action, AdminPrincipal, AuditAction, DenyReason, Permission, PermissionCheck, PermissionScope, Resource,
    Role, RoleAssignment, RoleName,
};

use super::InMemoryRbacRepository;
use crate::{InMemoryAuditRepository, InMemoryPermissionCache};

fn permission(value: &str) -> Permission {
    Permission::from_transport(value).unwrap_or_else(|_| unreachable!())
}

fn role(name: &str, parent_role_id: Option<RoleId>) -> Role {
    Role {
        id: RoleId::new(),
        name: RoleName::new(name).unwrap_or_else(|_| unreachable!()),
        description: String::new(),
        is_system_role: false,
        parent_role_id,
        permissions: BTreeSet::new(),
        version: 1,
        deleted_at: None,
    }
}

async fn principal(repository: &InMemoryRbacRepository, external_ref: &str) -> AdminPrincipal {
    repository
        .upsert_principal(PrincipalUpsert {
            external_ref: external_ref.to_owned(),
            email: None,
            is_super_admin: false,
            login_at: Utc::now(),
        })
        .await
        .unwrap_or_else(|_| unreachable!())
}

fn grant(principal_id: PrincipalId, role_id: RoleId, tenant_id: Option<TenantId>) -> RoleAssignment {
    RoleAssignment {
        id: AssignmentId::new(),
        principal_id,
        role_id,
        tenant_id,
        granted_by_id: principal_id,
        granted_at: Utc::now(),
        expires_at: None,
    }
}

#[tokio::test]
async fn hierarchy_edit_that_closes_a_cycle_leaves_store_unchanged() {
    let repository = InMemoryRbacRepository::new();
    let a = role("a", None);
    let b = role("b", Some(a.id));
    let c = role("c", Some(b.id));
    for role in [a.clone(), b.clone(), c.clone()] {
        assert!(repository.insert_role(role).await.is_ok());
    }

    let cyclic = repository.update_parent(a.id, Some(c.id), a.version, 16).await;
    let unchanged = repository.find_role(a.id).await;

    assert!(matches!(cyclic, Err(AppError::CyclicHierarchy { .. })));
    assert!(matches!(unchanged, Ok(Some(ref found)) if found == &a));
}

#[tokio::test]
async fn role_names_are_reusable_after_delete() {
    let repository = InMemoryRbacRepository::new();
    let first = role("auditor", None);
    assert!(repository.insert_role(first.clone()).await.is_ok());

    let duplicate = repository.insert_role(role("auditor", None)).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    assert!(repository.soft_delete_role(first.id, first.version, 16).await.is_ok());
    let reused = repository.insert_role(role("auditor", None)).await;
    let listed = repository.list_roles().await;

    assert!(reused.is_ok());
    assert!(matches!(listed, Ok(ref roles) if roles.len() == 1 && roles[0].id != first.id));
}

#[tokio::test]
async fn permission_edit_bumps_holders_of_descendants() {
    let repository = InMemoryRbacRepository::new();
    let parent = role("parent", None);
    let child = role("child", Some(parent.id));
    assert!(repository.insert_role(parent.clone()).await.is_ok());
    assert!(repository.insert_role(child.clone()).await.is_ok());
    let holder = principal(&repository, "idp|holder").await;
    let bystander = principal(&repository, "idp|bystander").await;
    assert!(repository.insert_assignment(grant(holder.id, child.id, None)).await.is_ok());

    let before = repository.find_principal(holder.id).await;
    let updated = repository
        .update_permissions(
            parent.id,
            BTreeSet::from([permission("order:read@global")]),
            parent.version,
            16,
        )
        .await;
    let after = repository.find_principal(holder.id).await;
    let untouched = repository.find_principal(bystander.id).await;

    assert!(matches!(updated, Ok(ref role) if role.version == parent.version + 1));
    let (Ok(Some(before)), Ok(Some(after))) = (before, after) else {
        panic!("holder should exist");
    };
    assert_eq!(after.assignment_version, before.assignment_version + 1);
    assert!(matches!(untouched, Ok(Some(ref found)) if found.assignment_version == bystander.assignment_version));
}

#[tokio::test]
async fn global_and_tenant_grants_are_distinct_keys() {
    let repository = InMemoryRbacRepository::new();
    let support = role("support", None);
    assert!(repository.insert_role(support.clone()).await.is_ok());
    let holder = principal(&repository, "idp|support").await;
    let tenant = TenantId::new();

    assert!(repository.insert_assignment(grant(holder.id, support.id, None)).await.is_ok());
    assert!(repository.insert_assignment(grant(holder.id, support.id, Some(tenant))).await.is_ok());
    let duplicate = repository.insert_assignment(grant(holder.id, support.id, None)).await;
    let orphan = repository
        .insert_assignment(grant(PrincipalId::new(), support.id, None))
        .await;

    assert!(matches!(duplicate, Err(AppError::DuplicateAssignment { tenant_id: None, .. })));
    assert!(matches!(orphan, Err(AppError::NotFound(_))));
    assert!(matches!(repository.delete_assignment(holder.id, support.id, Some(tenant)).await, Ok(true)));
    assert!(matches!(repository.delete_assignment(holder.id, support.id, Some(tenant)).await, Ok(false)));
    assert!(matches!(
        repository.list_assignments_for_principal(holder.id).await,
        Ok(ref held) if held.len() == 1 && held[0].tenant_id.is_none()
    ));
}

#[tokio::test]
async fn services_over_in_memory_adapters_enforce_tenant_isolation() {
    let repository = Arc::new(InMemoryRbacRepository::new());
    let audit = Arc::new(InMemoryAuditRepository::new());
    let recorder = AuditRecorder::new(audit.clone());
    let config = EngineConfig::default();
    let roles = RoleHierarchyService::new(repository.clone(), recorder.clone(), config);
    let assignments = RoleAssignmentService::new(
        repository.clone(),
        repository.clone(),
        repository.clone(),
        recorder.clone(),
        config,
    );
    let resolver = PermissionResolver::new(
        repository.clone(),
        repository.clone(),
        repository.clone(),
        config,
    )
    .with_cache(Arc::new(InMemoryPermissionCache::new()));
    let verifier = AccessVerifier::new(repository.clone(), resolver, recorder, config);

    let operator = PrincipalId::new();
    let tenant_admin = roles
        .create_role(
            operator,
            CreateRoleInput {
                name: "tenant_admin".to_owned(),
                description: "Manages one merchant".to_owned(),
                parent_role_id: None,
                permissions: vec![permission("order:write@tenant"), permission("order:read@tenant")],
            },
        )
        .await;
    let Ok(tenant_admin) = tenant_admin else {
        panic!("role creation should succeed");
    };
    let merchant = principal(&repository, "idp|merchant").await;
    let tenant_a = TenantId::new();
    let tenant_b = TenantId::new();

    let assigned = assignments
        .assign_role(AssignRoleInput {
            principal_id: merchant.id,
            role_id: tenant_admin.id,
            tenant_id: Some(tenant_a),
            granted_by_id: operator,
            expires_at: Some(Utc::now() + Duration::hours(1)),
        })
        .await;
    assert!(assigned.is_ok());

    let check = PermissionCheck::new(Resource::Order, Action::Write, PermissionScope::Tenant);
    let inside = verifier
        .require_permission_for(
            merchant.id,
            check,
            AccessContext {
                tenant_context: Some(tenant_a),
                client_ip: None,
            },
        )
        .await;
    let outside = verifier
        .require_permission_for(
            merchant.id,
            check,
            AccessContext {
                tenant_context: Some(tenant_b),
                client_ip: None,
            },
        )
        .await;

    assert!(inside.allowed);
    assert!(!outside.allowed);
    assert_eq!(outside.deny_reason, Some(DenyReason::MissingPermission));
    let mut actions = audit
        .list_entries(AuditLogQuery::default())
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|entry| entry.action.as_str())
        .collect::<Vec<_>>();
    actions.sort_unstable();
    assert_eq!(
        actions,
        vec![
            AuditAction::AccessDenied.as_str(),
            AuditAction::RoleAssigned.as_str(),
            AuditAction::RoleCreated.as_str()
        ]
    );
}

#[tokio::test]
async fn edits_that_leave_a_global_grant_tenant_only_are_rejected() {
    let repository = InMemoryRbacRepository::new();
    let mut base = role("base", None);
    base.permissions.insert(permission("order:read@global"));
    let mut child = role("child", Some(base.id));
    child.permissions.insert(permission("order:write@tenant"));
    assert!(repository.insert_role(base.clone()).await.is_ok());
    assert!(repository.insert_role(child.clone()).await.is_ok());
    let holder = principal(&repository, "idp|holder").await;
    assert!(repository.insert_assignment(grant(holder.id, child.id, None)).await.is_ok());

    let detached = repository.update_parent(child.id, None, child.version, 16).await;
    let deleted = repository.soft_delete_role(base.id, base.version, 16).await;
    let stripped = repository
        .update_permissions(base.id, BTreeSet::new(), base.version, 16)
        .await;

    assert!(matches!(detached, Err(AppError::Validation(_))));
    assert!(matches!(deleted, Err(AppError::Validation(_))));
    assert!(matches!(stripped, Err(AppError::Validation(_))));
    assert!(matches!(repository.find_role(base.id).await, Ok(Some(ref found)) if found == &base));
    assert!(matches!(repository.find_role(child.id).await, Ok(Some(ref found)) if found == &child));
}

fn hierarchy_and_assignments(
    repository: &Arc<InMemoryRbacRepository>,
) -> (RoleHierarchyService, RoleAssignmentService) {
    let recorder = AuditRecorder::new(Arc::new(InMemoryAuditRepository::new()));
    let config = EngineConfig::default();
    (
        RoleHierarchyService::new(repository.clone(), recorder.clone(), config),
        RoleAssignmentService::new(
            repository.clone(),
            repository.clone(),
            repository.clone(),
            recorder,
            config,
        ),
    )
}

#[tokio::test]
async fn concurrent_identical_grants_store_one_assignment() {
    let repository = Arc::new(InMemoryRbacRepository::new());
    let (_, assignments) = hierarchy_and_assignments(&repository);
    let support = role("support", None);
    assert!(repository.insert_role(support.clone()).await.is_ok());
    let holder = principal(&repository, "idp|support").await;
    let input = AssignRoleInput {
        principal_id: holder.id,
        role_id: support.id,
        tenant_id: None,
        granted_by_id: PrincipalId::new(),
        expires_at: None,
    };

    let (first, second) = tokio::join!(
        assignments.assign_role(input.clone()),
        assignments.assign_role(input)
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|outcome| matches!(
        outcome,
        Err(AppError::DuplicateAssignment { tenant_id: None, .. })
    )));
    assert!(matches!(
        repository.list_assignments_for_principal(holder.id).await,
        Ok(ref held) if held.len() == 1
    ));
}

#[tokio::test]
async fn concurrent_reverse_parent_edits_never_commit_a_cycle() {
    let repository = Arc::new(InMemoryRbacRepository::new());
    let (roles, _) = hierarchy_and_assignments(&repository);
    let a = role("a", None);
    let b = role("b", None);
    assert!(repository.insert_role(a.clone()).await.is_ok());
    assert!(repository.insert_role(b.clone()).await.is_ok());
    let operator = PrincipalId::new();

    let (a_under_b, b_under_a) = tokio::join!(
        roles.set_parent(operator, a.id, Some(b.id)),
        roles.set_parent(operator, b.id, Some(a.id))
    );

    assert_ne!(a_under_b.is_ok(), b_under_a.is_ok());
    let rejected = if a_under_b.is_ok() { b_under_a } else { a_under_b };
    assert!(matches!(rejected, Err(AppError::CyclicHierarchy { .. })));

    let a_ancestors = roles.ancestors(a.id).await;
    let b_ancestors = roles.ancestors(b.id).await;
    let (Ok(a_ancestors), Ok(b_ancestors)) = (a_ancestors, b_ancestors) else {
        panic!("ancestor walks should succeed on an acyclic hierarchy");
    };
    assert_eq!(a_ancestors.len() + b_ancestors.len(), 1);
    assert!(a_ancestors.iter().all(|ancestor| ancestor.id != a.id));
    assert!(b_ancestors.iter().all(|ancestor| ancestor.id != b.id));
}
